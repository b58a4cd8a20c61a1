//! Element symbols and characteristic emission-line tables.
//!
//! Energies are in keV. A zero energy marks a line absent for that element.
//! K-shell fit names are bare symbols (`Fe`), L-shell fit names carry an `_L`
//! suffix (`Pb_L`).

use std::fmt::{Display, Formatter};

pub const K_LINE_COUNT: usize = 4;
pub const L_LINE_COUNT: usize = 12;

const ELEMENT_SYMBOLS: [&str; 98] = [
    "H", "He", "Li", "Be", "B", "C", "N", "O", "F", "Ne", "Na", "Mg", "Al", "Si", "P", "S", "Cl",
    "Ar", "K", "Ca", "Sc", "Ti", "V", "Cr", "Mn", "Fe", "Co", "Ni", "Cu", "Zn", "Ga", "Ge", "As",
    "Se", "Br", "Kr", "Rb", "Sr", "Y", "Zr", "Nb", "Mo", "Tc", "Ru", "Rh", "Pd", "Ag", "Cd", "In",
    "Sn", "Sb", "Te", "I", "Xe", "Cs", "Ba", "La", "Ce", "Pr", "Nd", "Pm", "Sm", "Eu", "Gd", "Tb",
    "Dy", "Ho", "Er", "Tm", "Yb", "Lu", "Hf", "Ta", "W", "Re", "Os", "Ir", "Pt", "Au", "Hg", "Tl",
    "Pb", "Bi", "Po", "At", "Rn", "Fr", "Ra", "Ac", "Th", "Pa", "U", "Np", "Pu", "Am", "Cm", "Bk",
    "Cf",
];

const K_LINE_LABELS: [&str; K_LINE_COUNT] = ["Ka1", "Ka2", "Kb1", "Kb2"];
const K_LINE_RATIOS: [f64; K_LINE_COUNT] = [1.0, 0.51, 0.17, 0.01];

const L_LINE_LABELS: [&str; L_LINE_COUNT] = [
    "La1", "La2", "Lb1", "Lb2", "Lb3", "Lb4", "Lg1", "Lg2", "Lg3", "Lg4", "Ll", "Ln",
];
const L_LINE_RATIOS: [f64; L_LINE_COUNT] = [
    1.0, 0.11, 0.6, 0.2, 0.06, 0.04, 0.08, 0.01, 0.02, 0.005, 0.04, 0.01,
];

// (Z, [Ka1, Ka2, Kb1, Kb2])
const K_LINE_ENERGIES: [(usize, [f64; K_LINE_COUNT]); 34] = [
    (11, [1.041, 1.041, 1.071, 0.0]),
    (12, [1.254, 1.254, 1.302, 0.0]),
    (13, [1.487, 1.486, 1.557, 0.0]),
    (14, [1.740, 1.739, 1.836, 0.0]),
    (15, [2.014, 2.013, 2.139, 0.0]),
    (16, [2.308, 2.307, 2.464, 0.0]),
    (17, [2.622, 2.621, 2.816, 0.0]),
    (18, [2.958, 2.956, 3.190, 0.0]),
    (19, [3.314, 3.311, 3.590, 0.0]),
    (20, [3.692, 3.688, 4.013, 0.0]),
    (21, [4.091, 4.086, 4.461, 0.0]),
    (22, [4.511, 4.505, 4.932, 0.0]),
    (23, [4.952, 4.945, 5.427, 0.0]),
    (24, [5.415, 5.406, 5.947, 0.0]),
    (25, [5.899, 5.888, 6.490, 0.0]),
    (26, [6.404, 6.391, 7.058, 0.0]),
    (27, [6.930, 6.915, 7.649, 0.0]),
    (28, [7.478, 7.461, 8.265, 0.0]),
    (29, [8.048, 8.028, 8.905, 0.0]),
    (30, [8.639, 8.616, 9.572, 0.0]),
    (31, [9.252, 9.225, 10.264, 10.366]),
    (32, [9.886, 9.855, 10.982, 11.101]),
    (33, [10.544, 10.508, 11.726, 11.864]),
    (34, [11.222, 11.182, 12.496, 12.652]),
    (35, [11.924, 11.878, 13.291, 13.469]),
    (36, [12.649, 12.598, 14.112, 14.315]),
    (37, [13.395, 13.336, 14.961, 15.185]),
    (38, [14.165, 14.098, 15.835, 16.085]),
    (39, [14.958, 14.883, 16.738, 17.015]),
    (40, [15.775, 15.691, 17.668, 17.970]),
    (41, [16.615, 16.521, 18.623, 18.953]),
    (42, [17.479, 17.374, 19.608, 19.965]),
    (47, [22.163, 21.990, 24.942, 25.456]),
    (50, [25.271, 25.044, 28.486, 29.109]),
];

// (Z, [La1, La2, Lb1, Lb2, Lb3, Lb4, Lg1, Lg2, Lg3, Lg4, Ll, Ln])
const L_LINE_ENERGIES: [(usize, [f64; L_LINE_COUNT]); 7] = [
    (
        56,
        [4.466, 4.451, 4.828, 5.157, 4.926, 4.852, 5.531, 5.797, 5.809, 0.0, 3.954, 4.331],
    ),
    (
        74,
        [8.398, 8.335, 9.672, 9.961, 9.819, 9.525, 11.286, 11.608, 11.675, 0.0, 7.388, 8.724],
    ),
    (
        78,
        [9.442, 9.361, 11.071, 11.251, 11.234, 10.854, 12.942, 13.270, 13.361, 0.0, 8.268, 9.975],
    ),
    (
        79,
        [9.713, 9.628, 11.443, 11.585, 11.610, 11.205, 13.382, 13.710, 13.807, 0.0, 8.494, 10.309],
    ),
    (
        80,
        [9.989, 9.898, 11.823, 11.924, 11.995, 11.564, 13.831, 14.162, 14.264, 0.0, 8.722, 10.651],
    ),
    (
        82,
        [10.551, 10.449, 12.614, 12.623, 12.795, 12.307, 14.764, 15.098, 15.216, 0.0, 9.184, 11.349],
    ),
    (
        92,
        [13.615, 13.438, 17.220, 16.428, 17.454, 16.576, 20.167, 20.485, 20.712, 0.0, 11.618, 15.400],
    ),
];

pub fn element_symbol(atomic_number: usize) -> Option<&'static str> {
    if atomic_number == 0 {
        return None;
    }
    ELEMENT_SYMBOLS.get(atomic_number - 1).copied()
}

pub fn atomic_number_for_symbol(symbol: &str) -> Option<usize> {
    let normalized = symbol.trim();
    if normalized.is_empty() {
        return None;
    }

    ELEMENT_SYMBOLS
        .iter()
        .position(|candidate| candidate.eq_ignore_ascii_case(normalized))
        .map(|index| index + 1)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EmissionShell {
    K,
    L,
}

impl EmissionShell {
    pub const fn line_count(self) -> usize {
        match self {
            Self::K => K_LINE_COUNT,
            Self::L => L_LINE_COUNT,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ElementLine {
    pub label: &'static str,
    pub energy: f64,
    pub ratio: f64,
    /// Branching-ratio slot this line reads its override factor from.
    pub slot: usize,
}

/// An element resolved against the line tables, ready for basis generation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FitElement {
    name: String,
    symbol: &'static str,
    atomic_number: usize,
    shell: EmissionShell,
}

impl FitElement {
    /// Resolves a fit name such as `Fe` or `Pb_L`. Returns `None` when the
    /// symbol is unknown or the line table has no entry for that shell.
    pub fn parse(name: &str) -> Option<Self> {
        let trimmed = name.trim();
        let (symbol_text, shell) = match trimmed.split_once('_') {
            None => (trimmed, EmissionShell::K),
            Some((symbol, suffix)) if suffix.eq_ignore_ascii_case("K") => {
                (symbol, EmissionShell::K)
            }
            Some((symbol, suffix)) if suffix.eq_ignore_ascii_case("L") => {
                (symbol, EmissionShell::L)
            }
            Some(_) => return None,
        };

        let atomic_number = atomic_number_for_symbol(symbol_text)?;
        let symbol = element_symbol(atomic_number)?;
        let element = Self {
            name: trimmed.to_string(),
            symbol,
            atomic_number,
            shell,
        };
        (!element.lines().is_empty()).then_some(element)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn symbol(&self) -> &'static str {
        self.symbol
    }

    pub fn atomic_number(&self) -> usize {
        self.atomic_number
    }

    pub fn shell(&self) -> EmissionShell {
        self.shell
    }

    /// Lines present in the table for this element and shell, in slot order.
    pub fn lines(&self) -> Vec<ElementLine> {
        match self.shell {
            EmissionShell::K => table_lines(
                &K_LINE_ENERGIES,
                self.atomic_number,
                &K_LINE_LABELS,
                &K_LINE_RATIOS,
            ),
            EmissionShell::L => table_lines(
                &L_LINE_ENERGIES,
                self.atomic_number,
                &L_LINE_LABELS,
                &L_LINE_RATIOS,
            ),
        }
    }

    pub fn strongest_line(&self) -> Option<ElementLine> {
        self.lines()
            .into_iter()
            .max_by(|lhs, rhs| lhs.ratio.total_cmp(&rhs.ratio))
    }
}

impl Display for FitElement {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name)
    }
}

fn table_lines<const N: usize>(
    table: &[(usize, [f64; N])],
    atomic_number: usize,
    labels: &[&'static str; N],
    ratios: &[f64; N],
) -> Vec<ElementLine> {
    let Some((_, energies)) = table.iter().find(|(z, _)| *z == atomic_number) else {
        return Vec::new();
    };

    energies
        .iter()
        .enumerate()
        .filter(|(_, energy)| **energy > 0.0)
        .map(|(slot, energy)| ElementLine {
            label: labels[slot],
            energy: *energy,
            ratio: ratios[slot],
            slot,
        })
        .collect()
}

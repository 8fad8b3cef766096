//! periodic table data needed for parsing, writing, and weighing molecules

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Element {
    pub atomic_number: u8,
    pub symbol: &'static str,
    /// average atomic weight in daltons
    pub weight: f64,
    /// allowed valences in increasing order. an empty slice means the element
    /// never receives implicit hydrogens and is not valence-checked
    pub valences: &'static [u8],
}

const fn el(
    atomic_number: u8,
    symbol: &'static str,
    weight: f64,
    valences: &'static [u8],
) -> Element {
    Element {
        atomic_number,
        symbol,
        weight,
        valences,
    }
}

static ELEMENTS: [Element; 64] = [
    el(1, "H", 1.008, &[1]),
    el(2, "He", 4.003, &[0]),
    el(3, "Li", 6.941, &[1]),
    el(4, "Be", 9.012, &[2]),
    el(5, "B", 10.81, &[3]),
    el(6, "C", 12.011, &[4]),
    el(7, "N", 14.007, &[3, 5]),
    el(8, "O", 15.999, &[2]),
    el(9, "F", 18.998, &[1]),
    el(10, "Ne", 20.180, &[0]),
    el(11, "Na", 22.990, &[1]),
    el(12, "Mg", 24.305, &[2]),
    el(13, "Al", 26.982, &[3]),
    el(14, "Si", 28.086, &[4]),
    el(15, "P", 30.974, &[3, 5]),
    el(16, "S", 32.06, &[2, 4, 6]),
    el(17, "Cl", 35.45, &[1]),
    el(18, "Ar", 39.948, &[0]),
    el(19, "K", 39.098, &[1]),
    el(20, "Ca", 40.078, &[2]),
    el(21, "Sc", 44.956, &[]),
    el(22, "Ti", 47.867, &[]),
    el(23, "V", 50.942, &[]),
    el(24, "Cr", 51.996, &[]),
    el(25, "Mn", 54.938, &[]),
    el(26, "Fe", 55.845, &[]),
    el(27, "Co", 58.933, &[]),
    el(28, "Ni", 58.693, &[]),
    el(29, "Cu", 63.546, &[]),
    el(30, "Zn", 65.38, &[]),
    el(31, "Ga", 69.723, &[3]),
    el(32, "Ge", 72.630, &[4]),
    el(33, "As", 74.922, &[3, 5]),
    el(34, "Se", 78.971, &[2, 4, 6]),
    el(35, "Br", 79.904, &[1]),
    el(36, "Kr", 83.798, &[0]),
    el(37, "Rb", 85.468, &[1]),
    el(38, "Sr", 87.62, &[2]),
    el(39, "Y", 88.906, &[]),
    el(40, "Zr", 91.224, &[]),
    el(41, "Nb", 92.906, &[]),
    el(42, "Mo", 95.95, &[]),
    el(43, "Tc", 98.0, &[]),
    el(44, "Ru", 101.07, &[]),
    el(45, "Rh", 102.906, &[]),
    el(46, "Pd", 106.42, &[]),
    el(47, "Ag", 107.868, &[]),
    el(48, "Cd", 112.414, &[]),
    el(49, "In", 114.818, &[3]),
    el(50, "Sn", 118.710, &[2, 4]),
    el(51, "Sb", 121.760, &[3, 5]),
    el(52, "Te", 127.60, &[2, 4, 6]),
    el(53, "I", 126.904, &[1, 3, 5]),
    el(54, "Xe", 131.293, &[0]),
    el(55, "Cs", 132.905, &[1]),
    el(56, "Ba", 137.327, &[2]),
    el(74, "W", 183.84, &[]),
    el(76, "Os", 190.23, &[]),
    el(77, "Ir", 192.217, &[]),
    el(78, "Pt", 195.084, &[]),
    el(79, "Au", 196.967, &[]),
    el(80, "Hg", 200.592, &[]),
    el(82, "Pb", 207.2, &[2, 4]),
    el(83, "Bi", 208.980, &[3, 5]),
];

pub fn by_number(atomic_number: u8) -> Option<&'static Element> {
    ELEMENTS.iter().find(|e| e.atomic_number == atomic_number)
}

pub fn by_symbol(symbol: &str) -> Option<&'static Element> {
    ELEMENTS.iter().find(|e| e.symbol == symbol)
}

/// the valences used for implicit hydrogens and valence checks. charged atoms
/// borrow the valences of their isoelectronic neighbor, so `[N+]` behaves like
/// carbon and `[O-]` like fluorine
pub fn valences(atomic_number: u8, charge: i8) -> &'static [u8] {
    let shifted = atomic_number as i16 - charge as i16;
    if charge == 0 || !(1..=u8::MAX as i16).contains(&shifted) {
        return by_number(atomic_number).map_or(&[], |e| e.valences);
    }
    match by_number(shifted as u8) {
        // only shift within the main-group elements that have a valence model
        Some(e) if is_main_group(shifted as u8) => e.valences,
        _ => &[],
    }
}

fn is_main_group(atomic_number: u8) -> bool {
    matches!(atomic_number, 1 | 5..=9 | 14..=17 | 33..=35 | 51..=53)
}

/// symbols that SMILES allows outside of brackets
pub(crate) fn is_organic_subset(atomic_number: u8, aromatic: bool) -> bool {
    if aromatic {
        matches!(atomic_number, 5 | 6 | 7 | 8 | 15 | 16)
    } else {
        matches!(atomic_number, 5 | 6 | 7 | 8 | 9 | 15 | 16 | 17 | 35 | 53)
    }
}

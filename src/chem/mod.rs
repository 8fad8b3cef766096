//! A small, pure-Rust stand-in for the parts of a cheminformatics toolkit the
//! pipeline needs: reading SMILES and InChI connection tables, writing
//! canonical SMILES, Morgan atom environments, and average molecular weight.

use bitflags::bitflags;

pub mod element;
pub mod inchi;
pub mod morgan;

mod canon;
mod ring;
mod smiles;

/// the largest molecule, counting explicit hydrogens, that is read from any
/// notation. canonical ranking is quadratic in the length of a chain
pub const MAX_ATOMS: usize = 1000;

#[derive(Debug, thiserror::Error)]
pub enum ChemError {
    #[error("failed to parse `{input}` at position {pos}: {msg}")]
    Syntax {
        input: String,
        pos: usize,
        msg: String,
    },

    #[error("explicit valence {valence} for atom {atom} ({symbol}) is too high")]
    Valence {
        atom: usize,
        symbol: &'static str,
        valence: u32,
    },

    #[error("atom {0} is marked aromatic but is not in a ring")]
    NonRingAromatic(usize),

    #[error("invalid InChI `{input}`: {msg}")]
    Inchi { input: String, msg: String },

    #[error("unsupported InChI `{input}`: {feature}")]
    UnsupportedInchi {
        input: String,
        feature: &'static str,
    },

    #[error("molecule has more than {max} atoms")]
    TooLarge { max: usize },

    #[error("no atomic weight available for atomic number {0}")]
    UnknownWeight(u8),
}

bitflags! {
    /// checks applied after parsing. the empty set is the permissive mode used
    /// by the corpus builder, accepting radicals and unusual valences
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct SanitizeFlags: u32 {
        const VALENCE =     0x1;
        const AROMATICITY = 0x2;
        const ALL = Self::VALENCE.bits() | Self::AROMATICITY.bits();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BondOrder {
    Single,
    Double,
    Triple,
    Aromatic,
}

impl BondOrder {
    /// the number of valence electrons this bond takes from each atom, counting
    /// aromatic bonds as their sigma component
    pub fn valence(self) -> u32 {
        match self {
            BondOrder::Single | BondOrder::Aromatic => 1,
            BondOrder::Double => 2,
            BondOrder::Triple => 3,
        }
    }

    pub(crate) fn code(self) -> u8 {
        match self {
            BondOrder::Single => 1,
            BondOrder::Double => 2,
            BondOrder::Triple => 3,
            BondOrder::Aromatic => 4,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Atom {
    /// 0 for the `*` wildcard
    pub atomic_number: u8,
    pub charge: i8,
    pub isotope: Option<u16>,
    pub aromatic: bool,
    /// total attached hydrogens not present as explicit atoms
    pub hydrogens: u8,
    /// whether the hydrogen count was given explicitly (bracket atoms, InChI)
    /// rather than derived from the default valence
    pub explicit_h: bool,
}

impl Atom {
    pub fn symbol(&self) -> &'static str {
        element::by_number(self.atomic_number).map_or("*", |e| e.symbol)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bond {
    pub begin: usize,
    pub end: usize,
    pub order: BondOrder,
}

impl Bond {
    pub fn other(&self, atom: usize) -> usize {
        if self.begin == atom {
            self.end
        } else {
            self.begin
        }
    }
}

/// a molecular graph with hydrogens folded into their heavy atoms
#[derive(Debug, Clone)]
pub struct Mol {
    atoms: Vec<Atom>,
    bonds: Vec<Bond>,
    /// adjacency[atom] = [(neighbor, bond index)]
    adjacency: Vec<Vec<(usize, usize)>>,
}

impl Mol {
    pub(crate) fn from_parts(atoms: Vec<Atom>, bonds: Vec<Bond>) -> Self {
        let mut adjacency = vec![Vec::new(); atoms.len()];
        for (i, bond) in bonds.iter().enumerate() {
            adjacency[bond.begin].push((bond.end, i));
            adjacency[bond.end].push((bond.begin, i));
        }
        Self {
            atoms,
            bonds,
            adjacency,
        }
    }

    /// parse `smiles` without any sanitization checks
    pub fn from_smiles(smiles: &str) -> Result<Self, ChemError> {
        Self::from_smiles_with(smiles, SanitizeFlags::empty())
    }

    pub fn from_smiles_with(
        smiles: &str,
        flags: SanitizeFlags,
    ) -> Result<Self, ChemError> {
        let mut mol = smiles::parse(smiles)?;
        mol.assign_implicit_hydrogens();
        ring::perceive_aromaticity(&mut mol);
        mol.sanitize(flags)?;
        Ok(mol)
    }

    /// build a molecule from the formula, connection, and hydrogen layers of
    /// a standard InChI. see [inchi::parse] for the supported subset
    pub fn from_inchi(inchi: &str) -> Result<Self, ChemError> {
        let mut mol = inchi::parse(inchi)?;
        ring::perceive_aromaticity(&mut mol);
        Ok(mol)
    }

    /// canonical, non-isomeric SMILES
    pub fn to_smiles(&self) -> String {
        canon::write(self)
    }

    pub fn num_atoms(&self) -> usize {
        self.atoms.len()
    }

    pub fn num_bonds(&self) -> usize {
        self.bonds.len()
    }

    pub fn atoms(&self) -> &[Atom] {
        &self.atoms
    }

    pub fn bonds(&self) -> &[Bond] {
        &self.bonds
    }

    /// (neighbor, bond index) pairs for `atom`
    pub fn neighbors(&self, atom: usize) -> &[(usize, usize)] {
        &self.adjacency[atom]
    }

    pub fn degree(&self, atom: usize) -> usize {
        self.adjacency[atom].len()
    }

    /// average molecular weight, including implicit hydrogens
    pub fn mol_wt(&self) -> Result<f64, ChemError> {
        let hydrogen = element::by_number(1).map_or(1.008, |e| e.weight);
        let mut total = 0.0;
        for atom in &self.atoms {
            let e = element::by_number(atom.atomic_number)
                .ok_or(ChemError::UnknownWeight(atom.atomic_number))?;
            total += e.weight + atom.hydrogens as f64 * hydrogen;
        }
        Ok(total)
    }

    /// whether each bond is part of a ring
    pub fn ring_bonds(&self) -> Vec<bool> {
        ring::ring_bonds(self)
    }

    pub fn ring_atoms(&self) -> Vec<bool> {
        let ring_bonds = self.ring_bonds();
        let mut ret = vec![false; self.atoms.len()];
        for (bond, _) in self.bonds.iter().zip(&ring_bonds).filter(|(_, r)| **r)
        {
            ret[bond.begin] = true;
            ret[bond.end] = true;
        }
        ret
    }

    pub fn sanitize(&self, flags: SanitizeFlags) -> Result<(), ChemError> {
        if flags.contains(SanitizeFlags::VALENCE) {
            for (i, atom) in self.atoms.iter().enumerate() {
                let allowed =
                    element::valences(atom.atomic_number, atom.charge);
                let Some(&max) = allowed.last() else {
                    continue;
                };
                let valence = self.bond_valence(i) + atom.hydrogens as u32;
                if valence > max as u32 {
                    return Err(ChemError::Valence {
                        atom: i,
                        symbol: atom.symbol(),
                        valence,
                    });
                }
            }
        }
        if flags.contains(SanitizeFlags::AROMATICITY) {
            let in_ring = self.ring_atoms();
            if let Some(i) = (0..self.atoms.len())
                .find(|&i| self.atoms[i].aromatic && !in_ring[i])
            {
                return Err(ChemError::NonRingAromatic(i));
            }
        }
        Ok(())
    }

    /// sum of bond valences around `atom`, aromatic bonds counted once
    pub(crate) fn bond_valence(&self, atom: usize) -> u32 {
        self.adjacency[atom]
            .iter()
            .map(|&(_, b)| self.bonds[b].order.valence())
            .sum()
    }

    /// the hydrogen count an organic-subset atom would receive in SMILES
    /// given its current bonds
    pub(crate) fn default_hydrogens(&self, atom: usize) -> u8 {
        let a = &self.atoms[atom];
        let allowed = element::valences(a.atomic_number, a.charge);
        if a.atomic_number == 0 || allowed.is_empty() {
            return 0;
        }
        let used = self.bond_valence(atom);
        if a.aromatic {
            // one electron goes to the pi system
            return (allowed[0] as u32).saturating_sub(used + 1) as u8;
        }
        allowed
            .iter()
            .find(|&&v| v as u32 >= used)
            .map_or(0, |&v| (v as u32 - used) as u8)
    }

    fn assign_implicit_hydrogens(&mut self) {
        for i in 0..self.atoms.len() {
            if !self.atoms[i].explicit_h {
                self.atoms[i].hydrogens = self.default_hydrogens(i);
            }
        }
    }

    pub(crate) fn atom_mut(&mut self, atom: usize) -> &mut Atom {
        &mut self.atoms[atom]
    }

    pub(crate) fn set_bond_order(&mut self, bond: usize, order: BondOrder) {
        self.bonds[bond].order = order;
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;

    #[test]
    fn weights() {
        let tests = [
            ("O", 18.015),
            ("CCO", 46.069),
            ("c1ccccc1", 78.114),
            ("[NH4+]", 18.039),
        ];
        for (smiles, want) in tests {
            let got = Mol::from_smiles(smiles).unwrap().mol_wt().unwrap();
            assert_abs_diff_eq!(got, want, epsilon = 1e-3);
        }
    }

    #[test]
    fn wildcard_has_no_weight() {
        let mol = Mol::from_smiles("*C").unwrap();
        assert!(matches!(mol.mol_wt(), Err(ChemError::UnknownWeight(0))));
    }

    #[test]
    fn sanitize_valence() {
        let pentavalent = "C(C)(C)(C)(C)C";
        assert!(Mol::from_smiles(pentavalent).is_ok());
        assert!(matches!(
            Mol::from_smiles_with(pentavalent, SanitizeFlags::ALL),
            Err(ChemError::Valence { atom: 0, .. })
        ));
        assert!(Mol::from_smiles_with("[NH4+]", SanitizeFlags::ALL).is_ok());
        let pyrrole = Mol::from_smiles_with("c1cc[nH]c1", SanitizeFlags::ALL);
        assert!(pyrrole.is_ok());
    }

    #[test]
    fn sanitize_aromaticity() {
        assert!(Mol::from_smiles("cC").is_ok());
        assert!(matches!(
            Mol::from_smiles_with("cC", SanitizeFlags::AROMATICITY),
            Err(ChemError::NonRingAromatic(0))
        ));
    }

    #[test]
    fn ring_atoms() {
        let mol = Mol::from_smiles("C1CC1CC").unwrap();
        assert_eq!(mol.ring_atoms(), vec![true, true, true, false, false]);
    }
}

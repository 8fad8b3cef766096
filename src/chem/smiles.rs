//! SMILES reader. stereo markers are accepted and discarded

use std::collections::BTreeMap;

use super::{
    element, Atom, Bond, BondOrder, ChemError, Mol, MAX_ATOMS,
};

pub(crate) fn parse(smiles: &str) -> Result<Mol, ChemError> {
    let mut p = Parser {
        input: smiles.as_bytes(),
        smiles,
        pos: 0,
        atoms: Vec::new(),
        bonds: Vec::new(),
        rings: BTreeMap::new(),
        stack: Vec::new(),
        prev: None,
        pending: None,
    };
    if smiles.is_empty() {
        return Err(p.error("empty SMILES"));
    }
    p.parse()?;
    if let Some(ring) = p.rings.keys().next() {
        return Err(p.error(format!("unclosed ring bond {ring}")));
    }
    if !p.stack.is_empty() {
        return Err(p.error("unclosed branch"));
    }
    Ok(Mol::from_parts(p.atoms, p.bonds))
}

struct Parser<'a> {
    input: &'a [u8],
    smiles: &'a str,
    pos: usize,
    atoms: Vec<Atom>,
    bonds: Vec<Bond>,
    /// open ring bonds: number -> (atom, bond order written at the opening)
    rings: BTreeMap<u16, (usize, Option<BondOrder>)>,
    /// branch points
    stack: Vec<usize>,
    prev: Option<usize>,
    pending: Option<BondOrder>,
}

impl Parser<'_> {
    fn error(&self, msg: impl Into<String>) -> ChemError {
        ChemError::Syntax {
            input: self.smiles.to_owned(),
            pos: self.pos,
            msg: msg.into(),
        }
    }

    fn peek(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    fn next(&mut self) -> Option<u8> {
        let c = self.peek()?;
        self.pos += 1;
        Some(c)
    }

    fn parse(&mut self) -> Result<(), ChemError> {
        while let Some(c) = self.peek() {
            match c {
                b'(' => {
                    let Some(prev) = self.prev else {
                        return Err(self.error("branch without an atom"));
                    };
                    self.pos += 1;
                    self.stack.push(prev);
                }
                b')' => {
                    self.pos += 1;
                    let Some(top) = self.stack.pop() else {
                        return Err(self.error("unmatched ')'"));
                    };
                    self.prev = Some(top);
                    self.pending = None;
                }
                b'-' | b'=' | b'#' | b':' => {
                    self.pos += 1;
                    self.pending = Some(match c {
                        b'-' => BondOrder::Single,
                        b'=' => BondOrder::Double,
                        b'#' => BondOrder::Triple,
                        _ => BondOrder::Aromatic,
                    });
                }
                // directional single bonds
                b'/' | b'\\' => {
                    self.pos += 1;
                    self.pending = Some(BondOrder::Single);
                }
                b'.' => {
                    self.pos += 1;
                    self.prev = None;
                    self.pending = None;
                }
                b'%' => {
                    self.pos += 1;
                    let n = self.ring_number()?;
                    self.ring_bond(n)?;
                }
                b'0'..=b'9' => {
                    self.pos += 1;
                    self.ring_bond((c - b'0') as u16)?;
                }
                b'[' => self.bracket_atom()?,
                _ => self.organic_atom()?,
            }
        }
        Ok(())
    }

    /// the number after a '%': two digits, or `%(N)` for larger numbers
    fn ring_number(&mut self) -> Result<u16, ChemError> {
        if self.peek() == Some(b'(') {
            self.pos += 1;
            let n = self.number();
            if self.next() != Some(b')') {
                return Err(self.error("unclosed '%(' ring number"));
            }
            return n
                .and_then(|n| u16::try_from(n).ok())
                .ok_or_else(|| self.error("bad ring number in '%(...)'"));
        }
        let (Some(a), Some(b)) = (self.next(), self.next()) else {
            return Err(self.error("expected two digits after '%'"));
        };
        if !a.is_ascii_digit() || !b.is_ascii_digit() {
            return Err(self.error("expected two digits after '%'"));
        }
        Ok((a - b'0') as u16 * 10 + (b - b'0') as u16)
    }

    fn organic_atom(&mut self) -> Result<(), ChemError> {
        let start = self.pos;
        let Some(c) = self.next() else {
            return Err(self.error("unexpected end of input"));
        };
        let (atomic_number, aromatic) = match c {
            b'*' => (0, false),
            b'B' if self.peek() == Some(b'r') => {
                self.pos += 1;
                (35, false)
            }
            b'C' if self.peek() == Some(b'l') => {
                self.pos += 1;
                (17, false)
            }
            b'B' => (5, false),
            b'C' => (6, false),
            b'N' => (7, false),
            b'O' => (8, false),
            b'P' => (15, false),
            b'S' => (16, false),
            b'F' => (9, false),
            b'I' => (53, false),
            b'b' => (5, true),
            b'c' => (6, true),
            b'n' => (7, true),
            b'o' => (8, true),
            b'p' => (15, true),
            b's' => (16, true),
            _ => {
                self.pos = start;
                return Err(
                    self.error(format!("unexpected character '{}'", c as char))
                );
            }
        };
        self.push_atom(Atom {
            atomic_number,
            charge: 0,
            isotope: None,
            aromatic,
            hydrogens: 0,
            explicit_h: false,
        })
    }

    fn number(&mut self) -> Option<u32> {
        let start = self.pos;
        let mut n: u32 = 0;
        while let Some(d @ b'0'..=b'9') = self.peek() {
            n = n.saturating_mul(10).saturating_add((d - b'0') as u32);
            self.pos += 1;
        }
        (self.pos > start).then_some(n)
    }

    fn bracket_atom(&mut self) -> Result<(), ChemError> {
        self.pos += 1; // '['
        let isotope = self.number().map(|n| n.min(u16::MAX as u32) as u16);

        let Some(c) = self.next() else {
            return Err(self.error("unterminated bracket atom"));
        };
        let (atomic_number, aromatic) = if c == b'*' {
            (0, false)
        } else {
            let aromatic = c.is_ascii_lowercase();
            let mut symbol = String::from(c.to_ascii_uppercase() as char);
            if let Some(l) = self.peek().filter(u8::is_ascii_lowercase) {
                let two = format!("{symbol}{}", l as char);
                if element::by_symbol(&two).is_some() {
                    self.pos += 1;
                    symbol = two;
                }
            }
            let Some(e) = element::by_symbol(&symbol) else {
                return Err(self.error(format!("unknown element '{symbol}'")));
            };
            (e.atomic_number, aromatic)
        };

        // chirality, including the @TH1-style classes
        while self.peek() == Some(b'@') {
            self.pos += 1;
            while let Some(b'A'..=b'Z' | b'0'..=b'9') = self.peek() {
                if self.peek() == Some(b'H') {
                    break;
                }
                self.pos += 1;
            }
        }

        let mut hydrogens = 0;
        if self.peek() == Some(b'H') {
            self.pos += 1;
            hydrogens = self.number().unwrap_or(1).min(u8::MAX as u32) as u8;
        }

        let mut charge: i32 = 0;
        while let Some(s @ (b'+' | b'-')) = self.peek() {
            self.pos += 1;
            let sign = if s == b'+' { 1 } else { -1 };
            charge += sign * self.number().unwrap_or(1) as i32;
        }

        // atom map class
        if self.peek() == Some(b':') {
            self.pos += 1;
            self.number();
        }

        if self.next() != Some(b']') {
            return Err(self.error("expected ']'"));
        }

        self.push_atom(Atom {
            atomic_number,
            charge: charge.clamp(i8::MIN as i32, i8::MAX as i32) as i8,
            isotope,
            aromatic,
            hydrogens,
            explicit_h: true,
        })
    }

    fn push_atom(&mut self, atom: Atom) -> Result<(), ChemError> {
        let idx = self.atoms.len();
        if idx == MAX_ATOMS {
            return Err(ChemError::TooLarge { max: MAX_ATOMS });
        }
        self.atoms.push(atom);
        if let Some(prev) = self.prev {
            let order = self.pending.take();
            self.add_bond(prev, idx, order)?;
        }
        self.pending = None;
        self.prev = Some(idx);
        Ok(())
    }

    fn ring_bond(&mut self, n: u16) -> Result<(), ChemError> {
        let Some(current) = self.prev else {
            return Err(self.error("ring bond without an atom"));
        };
        match self.rings.remove(&n) {
            Some((open, order)) => {
                let order = self.pending.take().or(order);
                self.add_bond(open, current, order)?;
            }
            None => {
                self.rings.insert(n, (current, self.pending.take()));
            }
        }
        Ok(())
    }

    fn add_bond(
        &mut self,
        a: usize,
        b: usize,
        order: Option<BondOrder>,
    ) -> Result<(), ChemError> {
        if a == b {
            return Err(self.error("atom bonded to itself"));
        }
        if self.bonds.iter().any(|bd| {
            (bd.begin == a && bd.end == b) || (bd.begin == b && bd.end == a)
        }) {
            return Err(self.error("duplicate bond"));
        }
        let both_aromatic = self.atoms[a].aromatic && self.atoms[b].aromatic;
        let order = order.unwrap_or(if both_aromatic {
            BondOrder::Aromatic
        } else {
            BondOrder::Single
        });
        self.bonds.push(Bond {
            begin: a,
            end: b,
            order,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hydrogens(smiles: &str) -> Vec<u8> {
        Mol::from_smiles(smiles)
            .unwrap()
            .atoms()
            .iter()
            .map(|a| a.hydrogens)
            .collect()
    }

    #[test]
    fn implicit_hydrogens() {
        assert_eq!(hydrogens("C"), vec![4]);
        assert_eq!(hydrogens("CCO"), vec![3, 2, 1]);
        assert_eq!(hydrogens("C=C"), vec![2, 2]);
        assert_eq!(hydrogens("c1ccccc1"), vec![1; 6]);
        assert_eq!(hydrogens("CS(=O)(=O)C"), vec![3, 0, 0, 0, 3]);
        assert_eq!(hydrogens("[CH2]C"), vec![2, 3]);
        assert_eq!(hydrogens("c1cc[nH]c1"), vec![1, 1, 1, 1, 1]);
    }

    #[test]
    fn bracket_atoms() {
        let mol = Mol::from_smiles("[13CH3][O-]").unwrap();
        let atoms = mol.atoms();
        assert_eq!(atoms[0].isotope, Some(13));
        assert_eq!(atoms[0].hydrogens, 3);
        assert_eq!(atoms[1].charge, -1);
        assert_eq!(atoms[1].hydrogens, 0);

        let mol = Mol::from_smiles("[Fe++]").unwrap();
        assert_eq!(mol.atoms()[0].charge, 2);
        let mol = Mol::from_smiles("[C@@H](F)(Cl)Br").unwrap();
        assert_eq!(mol.atoms()[0].hydrogens, 1);
        assert_eq!(mol.num_bonds(), 3);
    }

    #[test]
    fn rings_and_branches() {
        let mol = Mol::from_smiles("C%12CC%12C(C)(C)C.O").unwrap();
        assert_eq!(mol.num_atoms(), 8);
        assert_eq!(mol.num_bonds(), 7);
        assert_eq!(mol.degree(3), 4);
        assert_eq!(mol.degree(7), 0);
    }

    #[test]
    fn long_ring_numbers() {
        let mol = Mol::from_smiles("C%(123)CCC%(123)").unwrap();
        assert_eq!(mol.num_bonds(), 4);
        assert_eq!(mol.degree(0), 2);
        let same = Mol::from_smiles("C%(5)CCC%05").unwrap();
        assert_eq!(same.num_bonds(), 4);
    }

    #[test]
    fn atom_limit() {
        assert!(Mol::from_smiles(&"C".repeat(MAX_ATOMS)).is_ok());
        assert!(matches!(
            Mol::from_smiles(&"C".repeat(20_000)),
            Err(ChemError::TooLarge { max: MAX_ATOMS })
        ));
    }

    #[test]
    fn invalid() {
        let bad = [
            "", "C(", "C)", "C1CC", "[", "[Xx]", "CQ", "C11", "(C)", "C%1",
            "C%(12", "C%()C", "C%(70000)CC%(70000)",
        ];
        for smiles in bad {
            assert!(
                matches!(
                    Mol::from_smiles(smiles),
                    Err(ChemError::Syntax { .. })
                ),
                "{smiles} should fail"
            );
        }
    }
}

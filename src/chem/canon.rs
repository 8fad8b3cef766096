//! canonical SMILES writer
//!
//! atoms are ranked by iterative refinement of their invariants, ties that
//! survive refinement are broken one at a time, and the molecule is written by
//! a depth-first walk that always visits the lowest-ranked neighbor first.

use std::collections::{BTreeMap, BTreeSet};

use super::{element, BondOrder, Mol};

/// invariants ordered so that the first key dominates
fn invariant(mol: &Mol, atom: usize) -> (u8, usize, u8, i8, u16, bool) {
    let a = &mol.atoms()[atom];
    (
        a.atomic_number,
        mol.degree(atom),
        a.hydrogens,
        a.charge,
        a.isotope.unwrap_or(0),
        a.aromatic,
    )
}

/// replace each key by its position among the sorted distinct keys
fn dense_ranks<K: Ord + Clone>(keys: &[K]) -> Vec<usize> {
    let sorted: Vec<K> = keys
        .iter()
        .cloned()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    keys.iter()
        .map(|k| sorted.binary_search(k).unwrap_or_default())
        .collect()
}

fn count_classes(ranks: &[usize]) -> usize {
    ranks.iter().collect::<BTreeSet<_>>().len()
}

/// split classes by the sorted ranks of their neighbors until stable. the
/// previous rank leads the key, so refinement never reorders classes
fn refine(mol: &Mol, mut ranks: Vec<usize>) -> Vec<usize> {
    let mut classes = count_classes(&ranks);
    loop {
        let keys: Vec<(usize, Vec<(usize, u8)>)> = (0..mol.num_atoms())
            .map(|i| {
                let mut nbrs: Vec<(usize, u8)> = mol
                    .neighbors(i)
                    .iter()
                    .map(|&(n, b)| (ranks[n], mol.bonds()[b].order.code()))
                    .collect();
                nbrs.sort_unstable();
                (ranks[i], nbrs)
            })
            .collect();
        let next = dense_ranks(&keys);
        let next_classes = count_classes(&next);
        ranks = next;
        if next_classes == classes {
            return ranks;
        }
        classes = next_classes;
    }
}

pub(crate) fn canonical_ranks(mol: &Mol) -> Vec<usize> {
    let n = mol.num_atoms();
    let invariants: Vec<_> = (0..n).map(|i| invariant(mol, i)).collect();
    let mut ranks = refine(mol, dense_ranks(&invariants));
    loop {
        let mut sizes: BTreeMap<usize, usize> = BTreeMap::new();
        for &r in &ranks {
            *sizes.entry(r).or_default() += 1;
        }
        // the lowest tied class gives up its first member
        let Some(class) =
            sizes.iter().find(|(_, c)| **c > 1).map(|(r, _)| *r)
        else {
            break;
        };
        let Some(tied) = (0..n).find(|&i| ranks[i] == class) else {
            break;
        };
        let keys: Vec<(usize, bool)> =
            (0..n).map(|i| (ranks[i], i != tied)).collect();
        ranks = refine(mol, dense_ranks(&keys));
    }
    ranks
}

struct Writer<'a> {
    mol: &'a Mol,
    ranks: Vec<usize>,
    visited: Vec<bool>,
    used: Vec<bool>,
    /// tree edges to follow from each atom, in output order
    children: Vec<Vec<(usize, usize)>>,
    /// ring bonds opened and closed at each atom
    opens: Vec<Vec<usize>>,
    closes: Vec<Vec<usize>>,
    digits: Vec<Option<usize>>,
    free: BTreeSet<usize>,
    /// the lowest ring digit never handed out
    next_digit: usize,
    out: String,
}

enum Step {
    Atom(usize),
    Bond(usize),
    Text(char),
}

impl Writer<'_> {
    fn sorted_neighbors(&self, atom: usize) -> Vec<(usize, usize)> {
        let mut nbrs = self.mol.neighbors(atom).to_vec();
        nbrs.sort_by_key(|&(n, _)| self.ranks[n]);
        nbrs
    }

    /// first pass: decide tree edges and ring closures with a depth-first
    /// walk from `root`
    fn plan(&mut self, root: usize) {
        self.visited[root] = true;
        let mut stack = vec![(root, self.sorted_neighbors(root), 0)];
        while let Some((atom, nbrs, next)) = stack.last_mut() {
            let atom = *atom;
            let Some(&(n, b)) = nbrs.get(*next) else {
                stack.pop();
                continue;
            };
            *next += 1;
            if self.used[b] {
                continue;
            }
            self.used[b] = true;
            if self.visited[n] {
                self.opens[n].push(b);
                self.closes[atom].push(b);
            } else {
                self.children[atom].push((n, b));
                self.visited[n] = true;
                stack.push((n, self.sorted_neighbors(n), 0));
            }
        }
    }

    /// second pass: emit the tree planned from `root`. branches are pushed in
    /// reverse so they come back off the stack in output order
    fn write(&mut self, root: usize) {
        let mut todo = vec![Step::Atom(root)];
        while let Some(step) = todo.pop() {
            match step {
                Step::Text(c) => self.out.push(c),
                Step::Bond(b) => self.write_bond(b),
                Step::Atom(atom) => {
                    self.write_atom(atom);
                    self.write_rings(atom);
                    let children = std::mem::take(&mut self.children[atom]);
                    let last = children.len().saturating_sub(1);
                    for (i, (n, b)) in children.into_iter().enumerate().rev() {
                        if i != last {
                            todo.push(Step::Text(')'));
                        }
                        todo.push(Step::Atom(n));
                        todo.push(Step::Bond(b));
                        if i != last {
                            todo.push(Step::Text('('));
                        }
                    }
                }
            }
        }
    }

    /// close the ring bonds ending at `atom`, then open the ones starting
    /// there. closed digits are free again for the next atom
    fn write_rings(&mut self, atom: usize) {
        let closes = std::mem::take(&mut self.closes[atom]);
        let mut closing: Vec<usize> =
            closes.iter().filter_map(|&b| self.digits[b]).collect();
        closing.sort_unstable();
        for &d in &closing {
            self.write_digit(d);
        }
        for b in std::mem::take(&mut self.opens[atom]) {
            let d = self.free.pop_first().unwrap_or(self.next_digit);
            self.next_digit = self.next_digit.max(d + 1);
            self.digits[b] = Some(d);
            self.write_bond(b);
            self.write_digit(d);
        }
        self.free.extend(closing);
    }

    fn write_digit(&mut self, d: usize) {
        match d {
            0..=9 => self.out.push_str(&d.to_string()),
            10..=99 => self.out.push_str(&format!("%{d}")),
            _ => self.out.push_str(&format!("%({d})")),
        }
    }

    fn write_bond(&mut self, bond: usize) {
        let b = &self.mol.bonds()[bond];
        let atoms = self.mol.atoms();
        let both_aromatic = atoms[b.begin].aromatic && atoms[b.end].aromatic;
        match b.order {
            BondOrder::Single if both_aromatic => self.out.push('-'),
            BondOrder::Single => {}
            BondOrder::Double => self.out.push('='),
            BondOrder::Triple => self.out.push('#'),
            BondOrder::Aromatic if both_aromatic => {}
            BondOrder::Aromatic => self.out.push(':'),
        }
    }

    fn write_atom(&mut self, atom: usize) {
        let a = &self.mol.atoms()[atom];
        let symbol = match element::by_number(a.atomic_number) {
            Some(e) if a.aromatic => e.symbol.to_lowercase(),
            Some(e) => e.symbol.to_owned(),
            None => "*".to_owned(),
        };
        let organic = a.atomic_number == 0
            || element::is_organic_subset(a.atomic_number, a.aromatic);
        let bare = organic
            && a.charge == 0
            && a.isotope.is_none()
            && a.hydrogens == self.mol.default_hydrogens(atom);
        if bare {
            self.out.push_str(&symbol);
            return;
        }
        self.out.push('[');
        if let Some(iso) = a.isotope {
            self.out.push_str(&iso.to_string());
        }
        self.out.push_str(&symbol);
        match a.hydrogens {
            0 => {}
            1 => self.out.push('H'),
            h => self.out.push_str(&format!("H{h}")),
        }
        match a.charge {
            0 => {}
            1 => self.out.push('+'),
            -1 => self.out.push('-'),
            c if c > 0 => self.out.push_str(&format!("+{c}")),
            c => self.out.push_str(&format!("-{}", -(c as i16))),
        }
        self.out.push(']');
    }
}

pub(crate) fn write(mol: &Mol) -> String {
    write_ranked(mol, canonical_ranks(mol))
}

/// write `mol` starting from and branching towards the lowest `ranks`
fn write_ranked(mol: &Mol, ranks: Vec<usize>) -> String {
    let n = mol.num_atoms();
    let mut w = Writer {
        mol,
        ranks,
        visited: vec![false; n],
        used: vec![false; mol.num_bonds()],
        children: vec![Vec::new(); n],
        opens: vec![Vec::new(); n],
        closes: vec![Vec::new(); n],
        digits: vec![None; mol.num_bonds()],
        free: (1..10).collect(),
        next_digit: 10,
        out: String::new(),
    };
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by_key(|&i| w.ranks[i]);

    let mut roots = Vec::new();
    for &start in &order {
        if !w.visited[start] {
            roots.push(start);
            w.plan(start);
        }
    }
    for (i, root) in roots.into_iter().enumerate() {
        if i > 0 {
            w.out.push('.');
        }
        w.write(root);
    }
    w.out
}

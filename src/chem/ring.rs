//! ring membership and a simple aromaticity model: five- and six-membered
//! rings with a fully conjugated Kekulé pattern become aromatic

use super::{BondOrder, Mol};

/// a bond is in a ring exactly when it is not a bridge of the molecular graph.
/// bridges come from Tarjan's low-link walk, run with an explicit stack
pub(crate) fn ring_bonds(mol: &Mol) -> Vec<bool> {
    let n = mol.num_atoms();
    let mut disc: Vec<Option<usize>> = vec![None; n];
    let mut low = vec![0; n];
    let mut ring = vec![true; mol.num_bonds()];
    let mut time = 0;

    for root in 0..n {
        if disc[root].is_some() {
            continue;
        }
        disc[root] = Some(time);
        low[root] = time;
        time += 1;
        // (atom, bond it was reached by, next neighbor to look at)
        let mut stack: Vec<(usize, Option<usize>, usize)> =
            vec![(root, None, 0)];
        while let Some(top) = stack.last_mut() {
            let (u, parent_bond) = (top.0, top.1);
            if let Some(&(v, b)) = mol.neighbors(u).get(top.2) {
                top.2 += 1;
                if Some(b) == parent_bond {
                    continue;
                }
                match disc[v] {
                    Some(d) => low[u] = low[u].min(d),
                    None => {
                        disc[v] = Some(time);
                        low[v] = time;
                        time += 1;
                        stack.push((v, Some(b), 0));
                    }
                }
                continue;
            }
            stack.pop();
            if let (Some(b), Some(&(p, _, _))) = (parent_bond, stack.last()) {
                low[p] = low[p].min(low[u]);
                if low[u] > disc[p].unwrap_or(0) {
                    ring[b] = false;
                }
            }
        }
    }
    ring
}

fn bond_between(mol: &Mol, a: usize, b: usize) -> Option<usize> {
    mol.neighbors(a)
        .iter()
        .find(|&&(n, _)| n == b)
        .map(|&(_, bond)| bond)
}

/// simple cycles with between `min` and `max` atoms, each reported once as an
/// ordered walk around the ring starting from its lowest atom index
pub(crate) fn small_cycles(
    mol: &Mol,
    min: usize,
    max: usize,
) -> Vec<Vec<usize>> {
    fn extend(
        mol: &Mol,
        ring: &[bool],
        path: &mut Vec<usize>,
        (min, max): (usize, usize),
        out: &mut Vec<Vec<usize>>,
    ) {
        let start = path[0];
        let u = path[path.len() - 1];
        for &(v, b) in mol.neighbors(u) {
            if !ring[b] {
                continue;
            }
            if v == start {
                // each ring is walked in both directions; keep one
                if path.len() >= min && path[1] < u {
                    out.push(path.clone());
                }
                continue;
            }
            if v > start && path.len() < max && !path.contains(&v) {
                path.push(v);
                extend(mol, ring, path, (min, max), out);
                path.pop();
            }
        }
    }

    let ring = ring_bonds(mol);
    let mut out = Vec::new();
    for s in 0..mol.num_atoms() {
        extend(mol, &ring, &mut vec![s], (min, max), &mut out);
    }
    out
}

fn cycle_bonds(mol: &Mol, cycle: &[usize]) -> Option<Vec<usize>> {
    (0..cycle.len())
        .map(|i| bond_between(mol, cycle[i], cycle[(i + 1) % cycle.len()]))
        .collect()
}

/// whether `atom` has a double or aromatic bond inside the ring `bonds`
fn conjugated_in(mol: &Mol, atom: usize, bonds: &[usize]) -> bool {
    mol.neighbors(atom).iter().any(|&(_, b)| {
        bonds.contains(&b)
            && matches!(
                mol.bonds()[b].order,
                BondOrder::Double | BondOrder::Aromatic
            )
    })
}

fn is_aromatic_ring(mol: &Mol, cycle: &[usize], bonds: &[usize]) -> bool {
    let atoms = mol.atoms();
    let sp2 = |a: usize| matches!(atoms[a].atomic_number, 6 | 7);
    let lone: Vec<usize> = cycle
        .iter()
        .copied()
        .filter(|&a| !conjugated_in(mol, a, bonds))
        .collect();
    match (cycle.len(), lone.as_slice()) {
        (6, &[]) => cycle.iter().all(|&a| sp2(a) && atoms[a].charge == 0),
        // pyrrole, furan, thiophene: one lone-pair donor closes the sextet
        (5, &[donor]) => {
            matches!(atoms[donor].atomic_number, 7 | 8 | 16)
                && atoms[donor].charge == 0
                && cycle.iter().filter(|&&a| a != donor).all(|&a| sp2(a))
        }
        _ => false,
    }
}

pub(crate) fn perceive_aromaticity(mol: &mut Mol) {
    let rings: Vec<(Vec<usize>, Vec<usize>)> = small_cycles(mol, 5, 6)
        .into_iter()
        .filter_map(|c| cycle_bonds(mol, &c).map(|b| (c, b)))
        .collect();
    // fused systems: marking one ring can make its neighbor qualify
    loop {
        let mut changed = false;
        for (cycle, bonds) in &rings {
            if bonds
                .iter()
                .all(|&b| mol.bonds()[b].order == BondOrder::Aromatic)
            {
                continue;
            }
            if !is_aromatic_ring(mol, cycle, bonds) {
                continue;
            }
            for &a in cycle {
                mol.atom_mut(a).aromatic = true;
            }
            for &b in bonds {
                mol.set_bond_order(b, BondOrder::Aromatic);
            }
            changed = true;
        }
        if !changed {
            break;
        }
    }
}

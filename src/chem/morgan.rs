//! Morgan (circular) atom environments, reported per atom and radius in the
//! order mol2vec reads them to build sentences.

use std::collections::BTreeSet;

use super::Mol;

const FNV_OFFSET: u64 = 0xcbf29ce484222325;
const FNV_PRIME: u64 = 0x100000001b3;

fn fnv1a(hash: u64, value: u64) -> u64 {
    let mut h = hash;
    for byte in value.to_le_bytes() {
        h ^= byte as u64;
        h = h.wrapping_mul(FNV_PRIME);
    }
    h
}

fn fold(h: u64) -> u32 {
    (h ^ (h >> 32)) as u32
}

/// identifiers for every atom and radius. `ret[atom][r]` is `None` when the
/// radius-`r` environment of `atom` covers no more bonds than radius `r - 1`,
/// or when an identical set of bonds was already reported for another atom or
/// a smaller radius. radius 0 is always present.
///
/// explicit hydrogen atoms are folded into their neighbors' invariants unless
/// the molecule has nothing else, in which case they are the atoms.
pub fn environments(mol: &Mol, radius: u32) -> Vec<Vec<Option<u32>>> {
    let atoms = mol.atoms();
    let heavy_only = atoms.iter().any(|a| a.atomic_number != 1);
    let included: Vec<usize> = (0..mol.num_atoms())
        .filter(|&i| !heavy_only || atoms[i].atomic_number != 1)
        .collect();
    let keep = |i: usize| !heavy_only || atoms[i].atomic_number != 1;
    let in_ring = mol.ring_atoms();

    let mut ids = vec![0u64; mol.num_atoms()];
    for &i in &included {
        let a = &atoms[i];
        let explicit_h = mol
            .neighbors(i)
            .iter()
            .filter(|&&(n, _)| !keep(n))
            .count();
        let degree = mol.degree(i) - explicit_h;
        let mut h = FNV_OFFSET;
        h = fnv1a(h, a.atomic_number as u64);
        h = fnv1a(h, degree as u64);
        h = fnv1a(h, a.hydrogens as u64 + explicit_h as u64);
        h = fnv1a(h, a.charge as i64 as u64);
        h = fnv1a(h, a.isotope.unwrap_or(0) as u64);
        h = fnv1a(h, in_ring[i] as u64);
        ids[i] = h;
    }

    let mut ret: Vec<Vec<Option<u32>>> = vec![Vec::new(); mol.num_atoms()];
    for &i in &included {
        ret[i].push(Some(fold(ids[i])));
    }

    let mut envs: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); mol.num_atoms()];
    let mut seen: BTreeSet<Vec<usize>> = BTreeSet::new();
    for r in 1..=radius {
        let mut next_ids = ids.clone();
        let mut next_envs = envs.clone();
        for &i in &included {
            let mut nbrs: Vec<(u8, u64)> = Vec::new();
            for &(n, b) in mol.neighbors(i) {
                if !keep(n) {
                    continue;
                }
                nbrs.push((mol.bonds()[b].order.code(), ids[n]));
                next_envs[i].insert(b);
                next_envs[i].extend(envs[n].iter().copied());
            }
            nbrs.sort_unstable();
            let mut h = fnv1a(FNV_OFFSET, r as u64);
            h = fnv1a(h, ids[i]);
            for (code, id) in nbrs {
                h = fnv1a(h, code as u64);
                h = fnv1a(h, id);
            }
            next_ids[i] = h;
        }

        for &i in &included {
            let grew = next_envs[i].len() > envs[i].len();
            let key: Vec<usize> = next_envs[i].iter().copied().collect();
            let token = (grew && seen.insert(key)).then(|| fold(next_ids[i]));
            ret[i].push(token);
        }
        ids = next_ids;
        envs = next_envs;
    }
    ret
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat(smiles: &str, radius: u32) -> Vec<u32> {
        let mol = Mol::from_smiles(smiles).unwrap();
        environments(&mol, radius)
            .into_iter()
            .flatten()
            .flatten()
            .collect()
    }

    #[test]
    fn radius_zero_is_per_atom() {
        let got = flat("CCO", 0);
        assert_eq!(got.len(), 3);
        // the two carbons differ in hydrogen count
        assert_ne!(got[0], got[1]);
        let got = flat("c1ccccc1", 0);
        assert!(got.iter().all(|&t| t == got[0]));
    }

    #[test]
    fn saturated_environments_are_dropped() {
        let mol = Mol::from_smiles("CC").unwrap();
        let envs = environments(&mol, 2);
        // both carbons see the same single bond at radius 1
        assert!(envs[0][1].is_some());
        assert_eq!(envs[1][1], None);
        assert_eq!(envs[0][2], None);
        assert_eq!(envs[1][2], None);
    }

    #[test]
    fn stable_and_input_order_independent() {
        assert_eq!(flat("CC(=O)O", 1), flat("CC(=O)O", 1));
        let mut a = flat("OCC", 1);
        let mut b = flat("CCO", 1);
        a.sort_unstable();
        b.sort_unstable();
        assert_eq!(a, b);
    }

    #[test]
    fn explicit_hydrogens_fold_in() {
        assert_eq!(flat("[H]C([H])([H])[H]", 1), flat("C", 1));
        assert_eq!(flat("[H][H]", 0).len(), 2);
    }
}

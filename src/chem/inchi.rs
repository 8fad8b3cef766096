//! Reads the connection table of a standard InChI.
//!
//! Only the main layers are used: the formula, `/c` connections and `/h`
//! fixed hydrogens. Bond orders are not part of an InChI, so they are
//! recovered by pairing up the unsatisfied valences of neighboring atoms.
//! Stereo and isotope layers are ignored. Multi-component structures, mobile
//! hydrogen groups and net charges are rejected, since the atoms they apply to
//! cannot be resolved from these layers alone.

use super::{
    element, Atom, Bond, BondOrder, ChemError, Mol, MAX_ATOMS,
};

pub fn parse(inchi: &str) -> Result<Mol, ChemError> {
    let err = |msg: &str| ChemError::Inchi {
        input: inchi.to_owned(),
        msg: msg.to_owned(),
    };
    let unsupported = |feature: &'static str| ChemError::UnsupportedInchi {
        input: inchi.to_owned(),
        feature,
    };

    let body = inchi
        .trim()
        .strip_prefix("InChI=")
        .ok_or_else(|| err("missing InChI= prefix"))?;
    let mut layers = body.split('/');
    match layers.next() {
        Some(v) if v.starts_with('1') => {}
        _ => return Err(err("unknown version")),
    }
    let formula = layers
        .next()
        .filter(|f| !f.is_empty())
        .ok_or_else(|| err("missing formula"))?;
    let multiplied = formula.starts_with(|c: char| c.is_ascii_digit());
    if formula.contains('.') || multiplied {
        return Err(unsupported("multiple components"));
    }

    let elements = parse_formula(formula).ok_or_else(|| err("bad formula"))?;
    let mut heavy = Vec::new();
    let mut total_h = 0;
    for (symbol, count) in elements {
        if symbol == "H" {
            total_h = count.saturating_add(total_h);
            continue;
        }
        let e = element::by_symbol(symbol)
            .ok_or_else(|| err("unknown element in formula"))?;
        if count > MAX_ATOMS - heavy.len() {
            return Err(ChemError::TooLarge { max: MAX_ATOMS });
        }
        heavy.extend(std::iter::repeat(e.atomic_number).take(count));
    }

    if heavy.is_empty() {
        // molecular hydrogen is the only structure without a heavy atom
        return match total_h {
            2 => Mol::from_smiles("[H][H]"),
            1 => Mol::from_smiles("[H]"),
            _ => Err(err("no heavy atoms")),
        };
    }

    let mut connections = Vec::new();
    let mut hydrogens = vec![0u8; heavy.len()];
    for layer in layers {
        let (tag, rest) =
            layer.split_at(layer.chars().next().map_or(0, char::len_utf8));
        match tag {
            "c" => {
                connections = parse_connections(rest, heavy.len())
                    .ok_or_else(|| err("bad connection layer"))?
            }
            "h" => {
                if rest.contains('(') {
                    return Err(unsupported("mobile hydrogens"));
                }
                parse_hydrogens(rest, &mut hydrogens)
                    .ok_or_else(|| err("bad hydrogen layer"))?
            }
            "q" | "p" => {
                if !matches!(rest, "" | "0" | "+0" | "-0") {
                    return Err(unsupported("net charge or protonation"));
                }
            }
            // the fixed-H and reconnected layers restate the structure
            "f" | "r" => break,
            _ => {}
        }
    }

    let orders = assign_orders(&heavy, &hydrogens, &connections);
    let atoms = heavy
        .iter()
        .zip(&hydrogens)
        .map(|(&atomic_number, &h)| Atom {
            atomic_number,
            charge: 0,
            isotope: None,
            aromatic: false,
            hydrogens: h,
            explicit_h: true,
        })
        .collect();
    let bonds = connections
        .iter()
        .zip(orders)
        .map(|(&(begin, end), order)| Bond { begin, end, order })
        .collect();
    Ok(Mol::from_parts(atoms, bonds))
}

/// Hill-ordered formula to (symbol, count) pairs
fn parse_formula(formula: &str) -> Option<Vec<(&str, usize)>> {
    let bytes = formula.as_bytes();
    let mut ret = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        if !bytes[i].is_ascii_uppercase() {
            return None;
        }
        let start = i;
        i += 1;
        while i < bytes.len() && bytes[i].is_ascii_lowercase() {
            i += 1;
        }
        let symbol = &formula[start..i];
        let digits = i;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
        }
        let count = if digits == i {
            1
        } else {
            formula[digits..i].parse().ok()?
        };
        ret.push((symbol, count));
    }
    Some(ret)
}

fn read_number(bytes: &[u8], i: &mut usize) -> Option<usize> {
    let start = *i;
    while *i < bytes.len() && bytes[*i].is_ascii_digit() {
        *i += 1;
    }
    std::str::from_utf8(&bytes[start..*i]).ok()?.parse().ok()
}

/// `1-2(3)4-1` style connection table to zero-based bonded pairs
fn parse_connections(
    layer: &str,
    natoms: usize,
) -> Option<Vec<(usize, usize)>> {
    let bytes = layer.as_bytes();
    let mut bonds: Vec<(usize, usize)> = Vec::new();
    let mut stack = Vec::new();
    let mut prev: Option<usize> = None;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'-' => i += 1,
            b'(' => {
                stack.push(prev?);
                i += 1;
            }
            b',' => {
                prev = Some(*stack.last()?);
                i += 1;
            }
            b')' => {
                prev = Some(stack.pop()?);
                i += 1;
            }
            b'0'..=b'9' => {
                let n = read_number(bytes, &mut i)?;
                if n == 0 || n > natoms {
                    return None;
                }
                let cur = n - 1;
                if let Some(p) = prev {
                    let exists = bonds.iter().any(|&(a, b)| {
                        (a, b) == (p, cur) || (a, b) == (cur, p)
                    });
                    if p != cur && !exists {
                        bonds.push((p, cur));
                    }
                }
                prev = Some(cur);
            }
            _ => return None,
        }
    }
    stack.is_empty().then_some(bonds)
}

/// `1-3,5H2,4H` style hydrogen counts
fn parse_hydrogens(layer: &str, hydrogens: &mut [u8]) -> Option<()> {
    let bytes = layer.as_bytes();
    let mut pending: Vec<usize> = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b',' => i += 1,
            b'0'..=b'9' => {
                let a = read_number(bytes, &mut i)?;
                let b = if bytes.get(i) == Some(&b'-') {
                    i += 1;
                    read_number(bytes, &mut i)?
                } else {
                    a
                };
                if a == 0 || b < a || b > hydrogens.len() {
                    return None;
                }
                pending.extend(a - 1..b);
            }
            b'H' => {
                i += 1;
                let count = if bytes.get(i).is_some_and(u8::is_ascii_digit) {
                    read_number(bytes, &mut i)?
                } else {
                    1
                };
                for a in pending.drain(..) {
                    hydrogens[a] = count.min(u8::MAX as usize) as u8;
                }
            }
            _ => return None,
        }
    }
    pending.is_empty().then_some(())
}

/// raise bond orders until every atom reaches its lowest valence that fits.
/// atoms with a single unsatisfied neighbor are paired first, which resolves
/// chains and alternating rings without backtracking
fn assign_orders(
    heavy: &[u8],
    hydrogens: &[u8],
    bonds: &[(usize, usize)],
) -> Vec<BondOrder> {
    let n = heavy.len();
    let mut degree = vec![0u32; n];
    for &(a, b) in bonds {
        degree[a] += 1;
        degree[b] += 1;
    }
    let mut deficit: Vec<u32> = (0..n)
        .map(|i| {
            let used = degree[i] + hydrogens[i] as u32;
            element::valences(heavy[i], 0)
                .iter()
                .find(|&&v| v as u32 >= used)
                .map_or(0, |&v| v as u32 - used)
        })
        .collect();
    let mut orders = vec![1u32; bonds.len()];

    let open = |deficit: &[u32], orders: &[u32], atom: usize| -> Vec<usize> {
        bonds
            .iter()
            .enumerate()
            .filter(|&(bi, &(a, b))| {
                (a == atom || b == atom)
                    && orders[bi] < 3
                    && deficit[if a == atom { b } else { a }] > 0
            })
            .map(|(bi, _)| bi)
            .collect()
    };

    loop {
        let candidates: Vec<(usize, Vec<usize>)> = (0..n)
            .filter(|&i| deficit[i] > 0)
            .map(|i| (i, open(&deficit, &orders, i)))
            .filter(|(_, o)| !o.is_empty())
            .collect();
        let pick = candidates
            .iter()
            .find(|(_, o)| o.len() == 1)
            .or_else(|| candidates.first())
            .map(|(_, o)| o[0]);
        let Some(bi) = pick else {
            break;
        };
        let (a, b) = bonds[bi];
        orders[bi] += 1;
        deficit[a] -= 1;
        deficit[b] -= 1;
    }

    orders
        .into_iter()
        .map(|o| match o {
            1 => BondOrder::Single,
            2 => BondOrder::Double,
            _ => BondOrder::Triple,
        })
        .collect()
}

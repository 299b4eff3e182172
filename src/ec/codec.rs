//! EC Math Adapter (§2, §6): thin call-outs to `encode`, `encode_update`
//! and `xor` against precomputed Galois-field tables, built on top of the
//! `isa-l` bindings the way `stripe-update`'s `ReedSolomon` does. The
//! underlying math library is out of scope per §1; this module is the
//! in-scope adapter around it, plus the per-object-class table cache
//! described in §9 ("Global runtime state").

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Arc;

use crate::{ec::Cell, AggError, AggResult};

/// Precomputed Reed-Solomon encode matrix and parity table for one
/// `(k, p)` object class. Equivalent to `stripe-update`'s `ReedSolomon`
/// fields, but split out from the behavior so it can be cached and shared
/// (read-only) across stripes and objects of the same class.
#[derive(Debug)]
pub struct CodecTables {
    k: usize,
    p: usize,
    encode_mat: Vec<u8>,
    encode_parity_table: Vec<u8>,
}

impl CodecTables {
    fn build(k: usize, p: usize) -> Self {
        let m = k + p;
        let encode_mat = isa_l::gf_gen_rs_matrix(k, m);
        let encode_parity_table = isa_l::ec_init_tables_owned(k, p, &encode_mat[(k * k)..]);
        Self {
            k,
            p,
            encode_mat,
            encode_parity_table,
        }
    }

    pub fn k(&self) -> usize {
        self.k
    }

    pub fn p(&self) -> usize {
        self.p
    }
}

/// Read-mostly table of [`CodecTables`] keyed by `(k, p)` object class.
/// Materialized on first use and owned by the aggregation run, not process
/// global state (§9): one [`CodecCache`] lives for the duration of a single
/// `aggregate()` call and is shared by every object context it creates.
#[derive(Debug, Default)]
pub struct CodecCache {
    tables: HashMap<(usize, usize), Arc<CodecTables>>,
}

impl CodecCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&mut self, k: NonZeroUsize, p: NonZeroUsize) -> Arc<CodecTables> {
        self.tables
            .entry((k.get(), p.get()))
            .or_insert_with(|| Arc::new(CodecTables::build(k.get(), p.get())))
            .clone()
    }
}

/// Encode a full stripe: `data` holds `k` cells, `parity` is overwritten
/// with `p` cells. Source cells are left unmodified.
pub fn encode(tables: &CodecTables, cell_bytes: usize, data: &[Cell], parity: &mut [Cell]) -> AggResult<()> {
    if data.len() != tables.k || parity.len() != tables.p {
        return Err(AggError::erasure_code(
            (file!(), line!(), column!()),
            format!(
                "expected {} data / {} parity cells, got {} / {}",
                tables.k,
                tables.p,
                data.len(),
                parity.len()
            ),
        ));
    }
    isa_l::ec_encode_data(
        cell_bytes,
        tables.k,
        tables.p,
        &tables.encode_parity_table,
        data,
        parity,
    );
    Ok(())
}

/// Fold the delta of one updated source cell into every parity cell,
/// without re-encoding the whole stripe. Mirrors `stripe-update`'s
/// `ReedSolomon::parity_delta_update`: `parity[j] ^= gf_mul(diff, coef)`
/// for the coefficient of `(cell_index, j)` in the parity generator rows
/// of the encode table.
pub fn encode_update(
    tables: &CodecTables,
    cell_index: usize,
    diff: &[u8],
    parity: &mut [Cell],
) -> AggResult<()> {
    if cell_index >= tables.k {
        return Err(AggError::out_of_range(
            (file!(), line!(), column!()),
            Some(0..tables.k),
            cell_index..cell_index + 1,
        ));
    }
    if parity.len() != tables.p {
        return Err(AggError::erasure_code(
            (file!(), line!(), column!()),
            format!(
                "expected {} parity cells for delta update, got {}",
                tables.p,
                parity.len()
            ),
        ));
    }
    parity
        .iter_mut()
        .enumerate()
        .for_each(|(parity_idx, parity_cell)| {
            parity_cell.iter_mut().zip(diff).for_each(|(p, &d)| {
                let coef =
                    tables.encode_parity_table[cell_index * 32 + parity_idx * tables.k * 32 + 1];
                *p ^= isa_l::gf_mul(d, coef);
            });
        });
    Ok(())
}

/// XOR `n` same-length vectors together into `out`. Used to compute the
/// `old XOR new` diff in the Partial-Update path (§4.5, §8 "XOR diff
/// law").
pub fn xor(vectors: &[&[u8]], out: &mut [u8]) -> AggResult<()> {
    if vectors.iter().any(|v| v.len() != out.len()) {
        return Err(AggError::erasure_code(
            (file!(), line!(), column!()),
            "xor operand length mismatch",
        ));
    }
    out.iter_mut().for_each(|b| *b = 0);
    for v in vectors {
        out.iter_mut().zip(v.iter()).for_each(|(o, &b)| *o ^= b);
    }
    Ok(())
}

/// Decode up to `p` absent cells from the surviving cells of a stripe.
/// Used by the round-trip property test in §8 and by the repair paths that
/// need to reconstruct data from parity.
pub fn decode(
    tables: &CodecTables,
    cell_bytes: usize,
    present: &[(usize, &Cell)],
    absent_idx: &[usize],
) -> AggResult<Vec<Cell>> {
    let k = tables.k;
    if absent_idx.len() > tables.p {
        return Err(AggError::erasure_code(
            (file!(), line!(), column!()),
            format!(
                "cannot decode {} cells from {} survivors with ({}, {}) rs code",
                absent_idx.len(),
                present.len(),
                k + tables.p,
                k
            ),
        ));
    }
    let (survivor_idx, survivor_cells): (Vec<_>, Vec<_>) = present
        .iter()
        .take(k)
        .map(|&(idx, cell)| (idx, cell.clone()))
        .unzip();
    if survivor_cells.len() < k {
        return Err(AggError::erasure_code(
            (file!(), line!(), column!()),
            "not enough surviving cells to decode",
        ));
    }
    let b = tables
        .encode_mat
        .chunks_exact(k)
        .enumerate()
        .filter_map(|(i, chunk)| survivor_idx.contains(&i).then_some(chunk))
        .flatten()
        .copied()
        .collect::<Vec<u8>>();
    let inv_mat = isa_l::gf_invert_matrix(b).ok_or_else(|| {
        AggError::erasure_code(
            (file!(), line!(), column!()),
            format!(
                "decode matrix in RS({}, {}) is not invertible",
                k + tables.p,
                k
            ),
        )
    })?;
    let mut decode_mat = vec![0u8; k * absent_idx.len()];
    decode_mat
        .chunks_exact_mut(k)
        .zip(absent_idx.iter())
        .for_each(|(decode_vec, &corrupt_idx)| {
            if corrupt_idx < k {
                decode_vec.copy_from_slice(&inv_mat[k * corrupt_idx..k * corrupt_idx + k]);
            } else {
                decode_vec.iter_mut().enumerate().for_each(|(i, b)| {
                    *b = 0;
                    for j in 0..k {
                        *b ^=
                            isa_l::gf_mul(inv_mat[j * k + i], tables.encode_mat[k * corrupt_idx + j]);
                    }
                })
            }
        });
    let decode_table = isa_l::ec_init_tables_owned(k, absent_idx.len(), decode_mat);
    let mut recovered = Cell::zero_n(absent_idx.len(), cell_bytes);
    isa_l::ec_encode_data(
        cell_bytes,
        k,
        absent_idx.len(),
        &decode_table,
        &survivor_cells,
        &mut recovered,
    );
    Ok(recovered)
}

#[cfg(test)]
mod test {
    use super::*;
    use std::num::NonZeroUsize;

    fn nz(n: usize) -> NonZeroUsize {
        NonZeroUsize::new(n).unwrap()
    }

    fn gen_cells(k: usize, cell_bytes: usize) -> Vec<Cell> {
        (0..k)
            .map(|_| {
                let bytes = (0..cell_bytes).map(|_| rand::random::<u8>()).collect::<Vec<u8>>();
                Cell::from(bytes)
            })
            .collect()
    }

    fn assert_cells_eq(label: &str, a: &[Cell], b: &[Cell]) {
        for (i, (a, b)) in a.iter().zip(b).enumerate() {
            if a != b {
                panic!(
                    "{label}: cell {i} mismatch\n  a: {}\n  b: {}",
                    hex::encode(a.as_ref()),
                    hex::encode(b.as_ref()),
                );
            }
        }
    }

    #[test]
    fn encode_then_decode_recovers_missing_cell() {
        let mut cache = CodecCache::new();
        let tables = cache.get(nz(4), nz(2));
        let cell_bytes = 64;
        let data = gen_cells(4, cell_bytes);
        let mut parity = Cell::zero_n(2, cell_bytes);
        encode(&tables, cell_bytes, &data, &mut parity).unwrap();
        // drop cell 1, recover it from the rest plus one parity cell
        let present: Vec<(usize, &Cell)> =
            vec![(0, &data[0]), (2, &data[2]), (3, &data[3]), (4, &parity[0])];
        let recovered = decode(&tables, cell_bytes, &present, &[1]).unwrap();
        assert_eq!(recovered[0], data[1]);
    }

    #[test]
    fn encode_update_matches_full_recalc() {
        let mut cache = CodecCache::new();
        let tables = cache.get(nz(4), nz(2));
        let cell_bytes = 32;
        let mut data = gen_cells(4, cell_bytes);
        let mut parity = Cell::zero_n(2, cell_bytes);
        encode(&tables, cell_bytes, &data, &mut parity).unwrap();

        let new_cell = gen_cells(1, cell_bytes).remove(0);
        let mut diff = vec![0u8; cell_bytes];
        xor(&[data[1].as_ref(), new_cell.as_ref()], &mut diff).unwrap();
        encode_update(&tables, 1, &diff, &mut parity).unwrap();

        data[1] = new_cell;
        let mut expect = Cell::zero_n(2, cell_bytes);
        encode(&tables, cell_bytes, &data, &mut expect).unwrap();
        assert_cells_eq("incremental vs. full recalc", &parity, &expect);
    }
}

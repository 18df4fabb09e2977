//! Property-based tests for observation blocks.

use proptest::prelude::*;

use scirs2_core::ndarray_ext::ArrayD;
use tensorfact_core::Block;

fn arb_dims() -> impl Strategy<Value = Vec<usize>> {
    prop::collection::vec(1usize..6, 2..4)
}

fn arb_sparse_block() -> impl Strategy<Value = (Vec<usize>, Vec<Vec<usize>>, Vec<f64>, bool)> {
    arb_dims().prop_flat_map(|dims| {
        let coord = dims
            .iter()
            .map(|&d| (0..d).boxed())
            .collect::<Vec<BoxedStrategy<usize>>>();
        let entries = prop::collection::vec(
            (coord, -10.0f64..10.0),
            0..20,
        );
        (Just(dims), entries, any::<bool>()).prop_map(|(dims, entries, scarce)| {
            let (indices, values): (Vec<_>, Vec<_>) = entries.into_iter().unzip();
            (dims, indices, values, scarce)
        })
    })
}

proptest! {
    #[test]
    fn sparse_construction_accepts_in_bounds_entries(
        (dims, indices, values, scarce) in arb_sparse_block()
    ) {
        let block = Block::sparse(indices.clone(), values.clone(), dims.clone(), scarce).unwrap();
        prop_assert_eq!(block.nnz(), values.len());
        prop_assert_eq!(block.dims(), dims.as_slice());
        prop_assert_eq!(block.is_complete(), !scarce);
    }

    #[test]
    fn mode_entries_partition_all_entries(
        (dims, indices, values, scarce) in arb_sparse_block()
    ) {
        let block = Block::sparse(indices, values, dims.clone(), scarce).unwrap();
        for mode in 0..dims.len() {
            let total: usize = (0..dims[mode])
                .map(|i| block.mode_entries(mode, i).count())
                .sum();
            prop_assert_eq!(total, block.nnz());
        }
    }

    #[test]
    fn entries_roundtrip_values(
        (dims, indices, values, scarce) in arb_sparse_block()
    ) {
        let block = Block::sparse(indices.clone(), values.clone(), dims, scarce).unwrap();
        let collected: Vec<(Vec<usize>, f64)> = block.entries().collect();
        prop_assert_eq!(collected.len(), values.len());
        for (i, (coords, v)) in collected.iter().enumerate() {
            prop_assert_eq!(coords, &indices[i]);
            prop_assert_eq!(*v, values[i]);
        }
    }

    #[test]
    fn dense_mode_entries_cover_every_cell(dims in arb_dims()) {
        let rank = dims.len();
        let data = ArrayD::from_shape_fn(dims.clone(), |ix| {
            (0..rank).map(|m| ix[m] as f64 + 1.0).product()
        });
        let block = Block::dense(data).unwrap();
        for mode in 0..dims.len() {
            let total: usize = (0..dims[mode])
                .map(|i| block.mode_entries(mode, i).count())
                .sum();
            prop_assert_eq!(total, block.size());
        }
    }

    #[test]
    fn var_total_is_positive(
        (dims, indices, values, scarce) in arb_sparse_block()
    ) {
        let block = Block::sparse(indices, values, dims, scarce).unwrap();
        prop_assert!(block.var_total() > 0.0);
    }
}

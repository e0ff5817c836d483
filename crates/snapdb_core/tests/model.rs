//! Model-based test: the database agrees with a plain map under
//! arbitrary put/delete/commit/abort sequences.

use proptest::prelude::*;
use snapdb_core::Database;
use std::collections::BTreeMap;

#[derive(Debug, Clone)]
enum Op {
    Put(u8, u8),
    Delete(u8),
    Commit,
    Abort,
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0u8..8, any::<u8>()).prop_map(|(k, v)| Op::Put(k, v)),
        (0u8..8).prop_map(Op::Delete),
        Just(Op::Commit),
        Just(Op::Abort),
    ]
}

proptest! {
    #[test]
    fn database_matches_model(ops in proptest::collection::vec(op_strategy(), 0..60)) {
        let db = Database::new();
        let mut committed: BTreeMap<Vec<u8>, Vec<u8>> = BTreeMap::new();
        let mut staged = committed.clone();
        let mut txn = None;

        for op in ops {
            match op {
                Op::Put(k, v) => {
                    let writer = txn.get_or_insert_with(|| db.begin_write().unwrap());
                    writer.put(vec![k], vec![v]).unwrap();
                    staged.insert(vec![k], vec![v]);
                    // Own writes are visible inside the transaction.
                    prop_assert_eq!(writer.get(&[k]).unwrap(), Some(vec![v]));
                }
                Op::Delete(k) => {
                    let writer = txn.get_or_insert_with(|| db.begin_write().unwrap());
                    let was_present = staged.remove([k].as_slice()).is_some();
                    prop_assert_eq!(writer.delete(&[k]).unwrap(), was_present);
                }
                Op::Commit => {
                    if let Some(writer) = txn.take() {
                        writer.commit().unwrap();
                        committed = staged.clone();
                    }
                }
                Op::Abort => {
                    if let Some(writer) = txn.take() {
                        writer.abort().unwrap();
                        staged = committed.clone();
                    }
                }
            }
        }
        // An open transaction at the end is dropped, which aborts it.
        drop(txn);

        let reader = db.begin_read().unwrap();
        prop_assert_eq!(reader.entry_count().unwrap(), committed.len() as u64);
        for (key, value) in &committed {
            let got = reader.get(key).unwrap();
            prop_assert_eq!(got.as_ref(), Some(value));
        }
        let keys = reader.keys().unwrap();
        prop_assert_eq!(keys, committed.keys().cloned().collect::<Vec<_>>());
    }
}

//! Pointer surgery on the recency list.

use super::{FileId, ViewDatabase};
use crate::storage::OptionSlabIndex;

impl ViewDatabase {
    /// Removes `file` from the recency list. A file that is not linked is
    /// left alone.
    pub(super) fn unlink(&mut self, file: FileId) {
        let (newer, older) = {
            let node = &self.files[file.0];
            (node.newer, node.older)
        };
        let is_head = self.latest.to_option() == Some(file.0);
        if newer.is_none() && older.is_none() && !is_head {
            return;
        }

        match newer.to_option() {
            Some(newer) => self.files[newer].older = older,
            None => self.latest = older,
        }
        match older.to_option() {
            Some(older) => self.files[older].newer = newer,
            None => self.oldest = newer,
        }

        let node = &mut self.files[file.0];
        node.newer = OptionSlabIndex::none();
        node.older = OptionSlabIndex::none();
    }

    pub(super) fn link_at_head(&mut self, file: FileId) {
        let previous_head = self.latest;
        {
            let node = &mut self.files[file.0];
            node.newer = OptionSlabIndex::none();
            node.older = previous_head;
        }
        match previous_head.to_option() {
            Some(head) => self.files[head].newer = OptionSlabIndex::some(file.0),
            None => self.oldest = OptionSlabIndex::some(file.0),
        }
        self.latest = OptionSlabIndex::some(file.0);
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::{add_file, file_stat, stamp};
    use super::*;

    fn order(db: &ViewDatabase) -> Vec<FileId> {
        db.iter_recent().collect()
    }

    #[test]
    fn recency_follows_reverse_call_order() {
        let mut db = ViewDatabase::new("/root");
        let a = add_file(&mut db, "", "a", 1);
        let b = add_file(&mut db, "", "b", 2);
        let c = add_file(&mut db, "d", "c", 3);
        assert_eq!(order(&db), vec![c, b, a]);

        // Touch in an order unrelated to the current positions.
        for (tick, id) in [(4, b), (5, a), (6, c), (7, a)] {
            db.mark_file_changed(id, Some(file_stat(2)), stamp(tick, 0));
        }
        assert_eq!(order(&db), vec![a, c, b]);
        assert_eq!(db.latest_file(), Some(a));
        assert_eq!(db.oldest_file(), Some(b));
        db.verify_integrity().unwrap();
    }

    #[test]
    fn remarking_head_does_not_duplicate() {
        let mut db = ViewDatabase::new("/root");
        let a = add_file(&mut db, "", "a", 1);
        for tick in 2..5 {
            db.mark_file_changed(a, Some(file_stat(tick as u64)), stamp(tick, 0));
        }
        assert_eq!(order(&db), vec![a]);
        db.verify_integrity().unwrap();
    }

    #[test]
    fn moving_tail_to_head() {
        let mut db = ViewDatabase::new("/root");
        let a = add_file(&mut db, "", "a", 1);
        let b = add_file(&mut db, "", "b", 2);
        let c = add_file(&mut db, "", "c", 3);
        db.mark_file_deleted(a, stamp(4, 0));
        assert_eq!(order(&db), vec![a, c, b]);
        assert_eq!(db.oldest_file(), Some(b));
        db.verify_integrity().unwrap();
    }
}

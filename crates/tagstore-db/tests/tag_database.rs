//! End-to-end behavior of the tag database on a real RocksDB instance.

use proptest::prelude::*;
use std::collections::{BTreeSet, HashMap};
use std::time::Duration;
use tagstore_db::{
    MergeOutcome, Operation, Predicate, PublicKey, StatementOperation, TableCounts, TagDatabase,
    SHOW_THRESHOLD,
};
use tempfile::{tempdir, TempDir};

fn open() -> (TempDir, TagDatabase) {
    let dir = tempdir().unwrap();
    let db = TagDatabase::open_path(dir.path()).unwrap();
    (dir, db)
}

struct Op<'a> {
    subject: &'a str,
    predicate: Predicate,
    object: &'a str,
    peer: &'a [u8],
    operation: Operation,
    clock: u64,
    is_local: bool,
}

impl<'a> Op<'a> {
    fn tag(subject: &'a str, object: &'a str, peer: &'a [u8]) -> Self {
        Self {
            subject,
            predicate: Predicate::Tag,
            object,
            peer,
            operation: Operation::Add,
            clock: 1,
            is_local: false,
        }
    }

    fn predicate(mut self, predicate: Predicate) -> Self {
        self.predicate = predicate;
        self
    }

    fn remove(mut self) -> Self {
        self.operation = Operation::Remove;
        self
    }

    fn clock(mut self, clock: u64) -> Self {
        self.clock = clock;
        self
    }

    fn local(mut self) -> Self {
        self.is_local = true;
        self
    }

    fn apply(self, db: &TagDatabase) -> MergeOutcome {
        let operation = StatementOperation::new(
            self.subject,
            self.predicate,
            self.object,
            self.operation,
            self.clock,
            PublicKey::from(self.peer),
        );
        db.add_operation(&operation, &[], self.is_local, false).unwrap()
    }
}

/// `count` distinct peers ADD the statement.
fn add_votes(db: &TagDatabase, subject: &str, predicate: Predicate, object: &str, count: u32) {
    for peer in 0..count {
        let key = format!("{object}-peer{peer}");
        Op::tag(subject, object, key.as_bytes())
            .predicate(predicate)
            .apply(db);
    }
}

fn counters(db: &TagDatabase, subject: &str, predicate: Predicate, object: &str) -> (u32, u32) {
    let statement = db.get_statement(subject, predicate, object).unwrap().unwrap();
    (statement.added_count, statement.removed_count)
}

fn set(items: &[&str]) -> BTreeSet<String> {
    items.iter().map(|s| s.to_string()).collect()
}

#[test]
fn remote_add_from_one_peer() {
    let (_dir, db) = open();
    let only_one = TableCounts {
        resources: 2,
        peers: 1,
        statements: 1,
        operations: 1,
    };

    assert_eq!(Op::tag("infohash", "tag", b"peer1").apply(&db), MergeOutcome::Inserted);
    assert_eq!(db.table_counts().unwrap(), only_one);

    // same operation, one from the past, a duplicate from the future
    Op::tag("infohash", "tag", b"peer1").apply(&db);
    Op::tag("infohash", "tag", b"peer1").clock(0).apply(&db);
    Op::tag("infohash", "tag", b"peer1").clock(1000).apply(&db);
    assert_eq!(db.table_counts().unwrap(), only_one);
    assert_eq!(counters(&db, "infohash", Predicate::Tag, "tag"), (1, 0));

    Op::tag("infohash", "tag", b"peer1").remove().clock(1001).apply(&db);
    assert_eq!(db.table_counts().unwrap(), only_one);
    assert_eq!(counters(&db, "infohash", Predicate::Tag, "tag"), (0, 1));
}

#[test]
fn remote_add_from_many_peers() {
    let (_dir, db) = open();

    for peer in [b"peer1", b"peer2", b"peer3"] {
        Op::tag("infohash", "tag", peer).apply(&db);
    }
    Op::tag("title", "infohash", b"peer1")
        .predicate(Predicate::Torrent)
        .apply(&db);

    assert_eq!(counters(&db, "infohash", Predicate::Tag, "tag"), (3, 0));
    assert_eq!(counters(&db, "title", Predicate::Torrent, "infohash"), (1, 0));

    Op::tag("infohash", "tag", b"peer2").remove().clock(2).apply(&db);
    Op::tag("title", "infohash", b"peer2")
        .predicate(Predicate::Torrent)
        .remove()
        .apply(&db);
    assert_eq!(counters(&db, "infohash", Predicate::Tag, "tag"), (2, 1));
    assert_eq!(counters(&db, "title", Predicate::Torrent, "infohash"), (1, 1));

    Op::tag("infohash", "tag", b"peer1").remove().clock(2).apply(&db);
    assert_eq!(counters(&db, "infohash", Predicate::Tag, "tag"), (1, 2));

    Op::tag("infohash", "tag", b"peer1").clock(3).apply(&db);
    assert_eq!(counters(&db, "infohash", Predicate::Tag, "tag"), (2, 1));
}

#[test]
fn fourth_peer_remove_keeps_adds() {
    let (_dir, db) = open();

    for (clock, peer) in [b"peer1", b"peer2", b"peer3"].into_iter().enumerate() {
        Op::tag("infohash", "tag", peer).clock(clock as u64 + 1).apply(&db);
    }
    Op::tag("infohash", "tag", b"peer4").remove().apply(&db);

    assert_eq!(counters(&db, "infohash", Predicate::Tag, "tag"), (3, 1));
}

#[test]
fn auto_generated_statement() {
    let (_dir, db) = open();
    db.add_auto_generated("infohash", Predicate::Tag, "tag").unwrap();

    let statement = db.get_statement("infohash", Predicate::Tag, "tag").unwrap().unwrap();
    assert_eq!(statement.added_count, SHOW_THRESHOLD);

    let rows = db.statement_operations(statement.id).unwrap();
    assert_eq!(rows.len(), 1);
    assert!(rows[0].auto_generated);
    assert_eq!(
        db.get_clock(&PublicKey::auto_generated(), "infohash", Predicate::Tag, "tag")
            .unwrap(),
        0
    );

    assert_eq!(db.get_objects("infohash", Predicate::Tag, true).unwrap(), ["tag"]);
    assert!(db.get_suggestions("infohash", Predicate::Tag).unwrap().is_empty());
}

#[test]
fn auto_generated_statement_not_suggested_after_remove() {
    let (_dir, db) = open();
    db.add_auto_generated("infohash", Predicate::Tag, "tag").unwrap();
    Op::tag("infohash", "tag", b"remote").remove().apply(&db);

    let statement = db.get_statement("infohash", Predicate::Tag, "tag").unwrap().unwrap();
    assert_eq!(statement.score(), 1);
    assert!(statement.auto_generated);
    assert!(db.get_objects("infohash", Predicate::Tag, true).unwrap().is_empty());
    assert!(db.get_suggestions("infohash", Predicate::Tag).unwrap().is_empty());
}

#[test]
fn multiple_tags_share_resources() {
    let (_dir, db) = open();
    add_votes(&db, "infohash1", Predicate::Tag, "tag1", 2);
    add_votes(&db, "infohash1", Predicate::Tag, "tag2", 2);
    add_votes(&db, "infohash1", Predicate::Tag, "tag3", 1);
    for tag in ["tag1", "tag2", "tag4", "tag5", "tag6"] {
        Op::tag("infohash2", tag, b"peer").apply(&db);
    }

    let counts = db.table_counts().unwrap();
    assert_eq!(counts.statements, 8);
    assert_eq!(counts.resources, 8);
    assert_eq!(counts.operations, 10);
    assert_eq!(counters(&db, "infohash1", Predicate::Tag, "tag1"), (2, 0));
}

#[test]
fn objects_above_threshold() {
    let (_dir, db) = open();
    add_votes(&db, "infohash1", Predicate::Tag, "tag1", SHOW_THRESHOLD - 1);
    add_votes(&db, "infohash1", Predicate::Tag, "tag2", SHOW_THRESHOLD);
    add_votes(&db, "infohash1", Predicate::Tag, "tag3", SHOW_THRESHOLD + 1);
    add_votes(&db, "infohash1", Predicate::Contributor, "Contributor", SHOW_THRESHOLD + 1);

    assert!(db.get_objects("missed infohash", Predicate::Tag, true).unwrap().is_empty());
    assert_eq!(db.get_objects("infohash1", Predicate::Tag, true).unwrap(), ["tag3", "tag2"]);
    assert_eq!(
        db.get_objects("infohash1", Predicate::Contributor, true).unwrap(),
        ["Contributor"]
    );
}

#[test]
fn removed_object_disappears() {
    let (_dir, db) = open();
    add_votes(&db, "infohash1", Predicate::Tag, "tag1", SHOW_THRESHOLD);
    add_votes(&db, "infohash1", Predicate::Tag, "tag2", SHOW_THRESHOLD);

    Op::tag("infohash1", "tag2", b"4").remove().apply(&db);

    assert_eq!(db.get_objects("infohash1", Predicate::Tag, true).unwrap(), ["tag1"]);
}

#[test]
fn threshold_boundary_moves_to_suggestions() {
    let (_dir, db) = open();
    Op::tag("infohash", "tag", b"peer1").apply(&db);
    Op::tag("infohash", "tag", b"peer2").apply(&db);
    assert_eq!(db.get_objects("infohash", Predicate::Tag, true).unwrap(), ["tag"]);

    Op::tag("infohash", "tag", b"peer2").remove().clock(2).apply(&db);
    assert_eq!(counters(&db, "infohash", Predicate::Tag, "tag"), (1, 1));
    assert!(db.get_objects("infohash", Predicate::Tag, true).unwrap().is_empty());
    assert_eq!(db.get_suggestions("infohash", Predicate::Tag).unwrap(), ["tag"]);
}

#[test]
fn case_sensitivity_is_symmetric() {
    let (_dir, db) = open();
    for (subject, object) in [("ubuntu", "torrent"), ("Ubuntu", "Torrent"), ("UBUNTU", "TORRENT")] {
        add_votes(&db, subject, Predicate::Torrent, object, SHOW_THRESHOLD);
    }

    let all_torrents = ["torrent", "Torrent", "TORRENT"];
    assert_eq!(db.get_objects("ubuntu", Predicate::Torrent, false).unwrap(), all_torrents);
    assert_eq!(db.get_objects("Ubuntu", Predicate::Torrent, false).unwrap(), all_torrents);
    assert_eq!(db.get_objects("ubuntu", Predicate::Torrent, true).unwrap(), ["torrent"]);
    assert_eq!(db.get_objects("Ubuntu", Predicate::Torrent, true).unwrap(), ["Torrent"]);

    let all_ubuntu = ["ubuntu", "Ubuntu", "UBUNTU"];
    assert_eq!(db.get_subjects("torrent", Predicate::Torrent, false).unwrap(), all_ubuntu);
    assert_eq!(db.get_subjects("Torrent", Predicate::Torrent, false).unwrap(), all_ubuntu);
    assert_eq!(db.get_subjects("torrent", Predicate::Torrent, true).unwrap(), ["ubuntu"]);
    assert_eq!(db.get_subjects("Torrent", Predicate::Torrent, true).unwrap(), ["Ubuntu"]);
}

#[test]
fn local_add_overrides_community() {
    let (_dir, db) = open();
    Op::tag("infohash1", "tag1", b"peer1").remove().apply(&db);
    Op::tag("infohash1", "tag1", b"peer2").remove().apply(&db);
    assert!(db.get_objects("infohash1", Predicate::Tag, true).unwrap().is_empty());

    Op::tag("infohash1", "tag1", b"peer3").local().apply(&db);
    Op::tag("infohash1", "contributor", b"peer3")
        .predicate(Predicate::Contributor)
        .local()
        .apply(&db);

    assert_eq!(db.get_objects("infohash1", Predicate::Tag, true).unwrap(), ["tag1"]);
    assert_eq!(
        db.get_objects("infohash1", Predicate::Contributor, true).unwrap(),
        ["contributor"]
    );
    // an opinion of its own removes it from suggestions
    assert!(db.get_suggestions("infohash1", Predicate::Contributor).unwrap().is_empty());
}

#[test]
fn local_remove_hides_popular_tag() {
    let (_dir, db) = open();
    Op::tag("infohash1", "tag1", b"peer1").apply(&db);
    Op::tag("infohash1", "tag1", b"peer2").apply(&db);
    assert_eq!(db.get_objects("infohash1", Predicate::Tag, true).unwrap(), ["tag1"]);

    Op::tag("infohash1", "tag1", b"peer3").remove().local().apply(&db);
    add_votes(&db, "infohash1", Predicate::Tag, "tag1", 5);

    assert!(db.get_objects("infohash1", Predicate::Tag, true).unwrap().is_empty());
}

#[test]
fn suggestions_need_non_negative_score() {
    let (_dir, db) = open();
    Op::tag("subject", "tag1", b"1").apply(&db);
    Op::tag("subject", "tag1", b"2").apply(&db);
    Op::tag("subject", "contributor", b"2")
        .predicate(Predicate::Contributor)
        .apply(&db);

    // enough support to be shown already
    assert!(db.get_suggestions("subject", Predicate::Tag).unwrap().is_empty());

    Op::tag("subject", "tag1", b"3").remove().apply(&db); // score 1
    Op::tag("subject", "tag1", b"4").remove().apply(&db); // score 0
    assert_eq!(db.get_suggestions("subject", Predicate::Tag).unwrap(), ["tag1"]);

    Op::tag("subject", "tag1", b"5").remove().apply(&db); // score -1
    assert!(db.get_suggestions("subject", Predicate::Tag).unwrap().is_empty());
}

#[test]
fn clock_of_operation() {
    let (_dir, db) = open();
    let peer = PublicKey::from(&b"peer"[..]);

    assert_eq!(db.get_clock(&peer, "infohash", Predicate::Tag, "tag").unwrap(), 0);
    Op::tag("infohash", "tag", b"peer").apply(&db);
    assert_eq!(db.get_clock(&peer, "infohash", Predicate::Tag, "tag").unwrap(), 1);
}

#[test]
fn gossip_skips_fresh_and_auto_generated() {
    let (_dir, db) = open();
    let minute = Duration::from_secs(60);
    let now = 1_000_000;
    let two_minutes_ago = now - 120_000;

    let tag = |object: &str, peer: &[u8], at: u64, auto_generated: bool| {
        let operation = StatementOperation::new(
            "infohash1",
            Predicate::Tag,
            object,
            Operation::Add,
            1,
            PublicKey::from(peer),
        );
        db.add_operation_at(&operation, &[], false, auto_generated, at)
            .unwrap();
    };

    tag("tag1", b"peer1", now, false);
    tag("tag2", b"peer1", now, false);
    tag("tag3", b"peer1", now, true);
    tag("tag3", b"peer2", now, true);
    assert!(db.get_operations_for_gossip_at(minute, now).unwrap().is_empty());

    // the same rows, aged by two minutes
    let later = now + 120_000;
    assert_eq!(db.get_operations_for_gossip_at(minute, later).unwrap().len(), 2);

    tag("old", b"peer3", two_minutes_ago, false);
    tag("old-auto", b"peer3", two_minutes_ago, true);
    let eligible = db.get_operations_for_gossip_at(minute, now).unwrap();
    assert_eq!(eligible.len(), 1);
    assert!(!eligible[0].auto_generated);
}

#[test]
fn sampling_counts() {
    let (_dir, db) = open();
    add_votes(&db, "infohash", Predicate::Tag, "three", 3);

    assert_eq!(db.sample_by_condition(|_| true, 5, 100).unwrap().len(), 3);

    add_votes(&db, "infohash", Predicate::Tag, "seven", 7);
    let sample = db.sample_by_condition(|_| true, 5, 100).unwrap();
    let distinct: BTreeSet<_> = sample.iter().map(|op| op.id).collect();
    assert_eq!(distinct.len(), 5);
}

#[test]
fn intersection_respects_threshold() {
    let (_dir, db) = open();
    add_votes(&db, "infohash1", Predicate::Tag, "tag1", SHOW_THRESHOLD);
    add_votes(&db, "infohash2", Predicate::Tag, "tag1", SHOW_THRESHOLD - 1);
    add_votes(&db, "infohash3", Predicate::Tag, "tag1", SHOW_THRESHOLD);

    assert_eq!(
        db.get_subjects_intersection(&["tag1"], Predicate::Tag, true).unwrap(),
        set(&["infohash1", "infohash3"])
    );
}

#[test]
fn intersection_of_several_objects() {
    let (_dir, db) = open();
    for (subject, predicate, object) in [
        ("infohash1", Predicate::Tag, "tag1"),
        ("infohash1", Predicate::Tag, "tag2"),
        ("infohash1", Predicate::Contributor, "Contributor"),
        ("infohash2", Predicate::Tag, "tag1"),
        ("infohash2", Predicate::Contributor, "Contributor"),
        ("infohash3", Predicate::Tag, "tag2"),
        ("infohash4", Predicate::Tag, "TAG1"),
        ("infohash4", Predicate::Tag, "TAG2"),
    ] {
        add_votes(&db, subject, predicate, object, SHOW_THRESHOLD);
    }

    let intersect = |objects: &[&str], predicate| {
        db.get_subjects_intersection(objects, predicate, true).unwrap()
    };

    assert!(intersect(&["missed tag"], Predicate::Tag).is_empty());
    assert!(intersect(&["tag1"], Predicate::Contributor).is_empty());

    assert_eq!(intersect(&["tag1"], Predicate::Tag), set(&["infohash1", "infohash2"]));
    assert_eq!(intersect(&["tag2"], Predicate::Tag), set(&["infohash1", "infohash3"]));
    assert_eq!(intersect(&["tag1", "tag2"], Predicate::Tag), set(&["infohash1"]));
    assert_eq!(
        intersect(&["Contributor"], Predicate::Contributor),
        set(&["infohash1", "infohash2"])
    );

    let insensitive = db
        .get_subjects_intersection(&["tag1", "tag2"], Predicate::Tag, false)
        .unwrap();
    assert_eq!(insensitive, set(&["infohash1", "infohash4"]));
}

#[test]
fn local_operations_gossip_and_reapply_elsewhere() {
    let (_dir_a, a) = open();
    let (_dir_b, b) = open();

    a.add_local_operation_at("infohash", Predicate::Tag, "linux", Operation::Add, 0)
        .unwrap();
    a.add_local_operation_at("infohash", Predicate::Tag, "ubuntu", Operation::Add, 0)
        .unwrap();

    let rows = a.get_operations_for_gossip_at(Duration::from_secs(60), 60_000).unwrap();
    let batch = a.signed_operations(&rows).unwrap();
    for signed in &batch {
        signed.verify().unwrap();
    }

    let report = b.add_remote_operations(&batch).unwrap();
    assert_eq!((report.accepted, report.stale), (2, 0));
    assert_eq!(b.add_remote_operations(&batch).unwrap().stale, 2);

    assert_eq!(
        b.get_clock(a.local_public_key(), "infohash", Predicate::Tag, "linux")
            .unwrap(),
        1
    );
    // one remote vote is below the threshold on the receiving side
    assert_eq!(b.get_suggestions("infohash", Predicate::Tag).unwrap(), ["linux", "ubuntu"]);
}

#[test]
fn reopen_keeps_state() {
    let dir = tempdir().unwrap();
    {
        let db = TagDatabase::open_path(dir.path()).unwrap();
        add_votes(&db, "infohash", Predicate::Tag, "tag", SHOW_THRESHOLD);
    }
    let db = TagDatabase::open_path(dir.path()).unwrap();
    assert_eq!(db.get_objects("infohash", Predicate::Tag, true).unwrap(), ["tag"]);
}

fn arb_op() -> impl Strategy<Value = (u8, bool, u64)> {
    (0u8..4, any::<bool>(), 0u64..8)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn stored_counters_match_registers(ops in prop::collection::vec(arb_op(), 1..25)) {
        let (_dir, db) = open();
        for &(peer, add, clock) in &ops {
            let op = Op::tag("s", "o", std::slice::from_ref(&peer)).clock(clock);
            if add { op.apply(&db); } else { op.remove().apply(&db); }
        }

        let statement = db.get_statement("s", Predicate::Tag, "o").unwrap().unwrap();
        let rows = db.statement_operations(statement.id).unwrap();
        let added = rows.iter().filter(|r| r.operation == Operation::Add).count() as u32;
        let removed = rows.iter().filter(|r| r.operation == Operation::Remove).count() as u32;
        prop_assert_eq!((statement.added_count, statement.removed_count), (added, removed));

        // each peer keeps the first operation delivered at its highest clock
        let mut expected: HashMap<u8, (u64, bool)> = HashMap::new();
        for &(peer, add, clock) in &ops {
            match expected.get(&peer) {
                Some(&(stored, _)) if stored >= clock => {}
                _ => { expected.insert(peer, (clock, add)); }
            }
        }
        let adds = expected.values().filter(|(_, add)| *add).count() as u32;
        prop_assert_eq!(statement.added_count, adds);
        prop_assert_eq!(statement.removed_count, expected.len() as u32 - adds);
    }

    #[test]
    fn redelivery_changes_nothing(ops in prop::collection::vec(arb_op(), 1..15)) {
        let (_dir, db) = open();
        let apply_all = || {
            for &(peer, add, clock) in &ops {
                let op = Op::tag("s", "o", std::slice::from_ref(&peer)).clock(clock);
                if add { op.apply(&db); } else { op.remove().apply(&db); }
            }
        };

        apply_all();
        let before = db.get_statement("s", Predicate::Tag, "o").unwrap();
        let counts = db.table_counts().unwrap();
        apply_all();
        prop_assert_eq!(db.get_statement("s", Predicate::Tag, "o").unwrap(), before);
        prop_assert_eq!(db.table_counts().unwrap(), counts);
    }
}

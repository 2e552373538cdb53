//! End-to-end behaviour of the workspace store.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use gitspace::storage::{
    DiffStatus, EmptyCommitPolicy, ErrorKind, GitSignature, StorageError, StoreConfig, WorkspaceStore,
};
use tempfile::TempDir;

fn setup() -> (TempDir, WorkspaceStore) {
    let dir = TempDir::new().unwrap();
    let store = WorkspaceStore::open(StoreConfig::new(dir.path().join("repos"))).unwrap();
    (dir, store)
}

fn ada() -> GitSignature {
    GitSignature::new("Ada", "ada@example.com")
}

fn text(bytes: Vec<u8>) -> String {
    String::from_utf8(bytes).unwrap()
}

#[test]
fn new_workspace_has_one_seed_commit() {
    let (_dir, store) = setup();
    store.create_repository("notes").unwrap();

    let commits = store.list_commits("notes", 1).unwrap();
    assert_eq!(commits.len(), 1);
    assert_eq!(commits[0].message, "Initial commit");
    assert!(commits[0].parent_ids.is_empty());

    let readme = text(store.read_file("notes", "README.md").unwrap());
    assert!(readme.starts_with("# notes"));
}

#[test]
fn write_overwrites_and_read_sees_latest() {
    let (_dir, store) = setup();
    store.create_repository("notes").unwrap();

    store.write_file("notes", "a.txt", "hello", "first", &ada()).unwrap();
    assert_eq!(text(store.read_file("notes", "a.txt").unwrap()), "hello");

    store.write_file("notes", "a.txt", "world", "second", &ada()).unwrap();
    assert_eq!(text(store.read_file("notes", "a.txt").unwrap()), "world");

    let messages: Vec<_> = store
        .list_commits("notes", 10)
        .unwrap()
        .into_iter()
        .map(|c| c.message)
        .collect();
    assert_eq!(messages, vec!["second", "first", "Initial commit"]);
}

#[test]
fn diff_of_first_write_is_one_added_line() {
    let (_dir, store) = setup();
    store.create_repository("notes").unwrap();
    let commit = store.write_file("notes", "a.txt", "hello", "add a", &ada()).unwrap();

    let diff = store.diff_commit("notes", &commit.id.to_string()).unwrap();
    assert_eq!(diff.files.len(), 1);
    let file = &diff.files[0];
    assert_eq!(file.path, "a.txt");
    assert_eq!(file.status, DiffStatus::Added);
    assert_eq!((file.additions, file.deletions), (1, 0));
    assert_eq!(diff.stats.files_changed, 1);
    assert!(file.patch.contains("+hello"));
}

#[test]
fn delete_makes_file_unreadable() {
    let (_dir, store) = setup();
    store.create_repository("notes").unwrap();
    store.write_file("notes", "a.txt", "hello", "add", &ada()).unwrap();

    let commit = store.delete_file("notes", "a.txt", "remove", &ada()).unwrap();
    let err = store.read_file("notes", "a.txt").unwrap_err();
    assert!(err.is_not_found());

    let diff = store.diff_commit("notes", &commit.id.to_string()).unwrap();
    assert_eq!(diff.files[0].status, DiffStatus::Deleted);
    assert_eq!(diff.files[0].path, "a.txt");
    assert_eq!(diff.stats.deletions, 1);

    let err = store.delete_file("notes", "a.txt", "again", &ada()).unwrap_err();
    assert!(err.is_not_found());
}

#[test]
fn fork_copies_history_then_diverges() {
    let (_dir, store) = setup();
    store.create_repository("origin").unwrap();
    store.write_file("origin", "a.txt", "1", "one", &ada()).unwrap();

    let before = store.list_commits("origin", 100).unwrap();
    store.duplicate_repository("origin", "fork").unwrap();
    assert_eq!(store.list_commits("fork", 100).unwrap(), before);

    store.write_file("origin", "b.txt", "2", "two", &ada()).unwrap();
    assert_eq!(store.list_commits("fork", 100).unwrap(), before);
    assert!(store.read_file("fork", "b.txt").unwrap_err().is_not_found());

    store.write_file("fork", "c.txt", "3", "three", &ada()).unwrap();
    assert!(store.read_file("origin", "c.txt").unwrap_err().is_not_found());
}

#[test]
fn fork_errors_are_clone_errors() {
    let (_dir, store) = setup();
    let err = store.duplicate_repository("ghost", "copy").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Clone);

    store.create_repository("a").unwrap();
    store.create_repository("b").unwrap();
    let err = store.duplicate_repository("a", "b").unwrap_err();
    assert!(matches!(err, StorageError::CloneTargetExists { .. }));
}

#[test]
fn merge_is_a_union_where_source_wins() {
    let (_dir, store) = setup();
    store.create_repository("ws").unwrap();
    store.write_file("ws", "shared.txt", "base", "base", &ada()).unwrap();
    store.create_branch("ws", "feature").unwrap();

    // target: x=1 and its own shared.txt
    store.write_file("ws", "x.txt", "1", "x", &ada()).unwrap();
    store.write_file("ws", "shared.txt", "main", "main edit", &ada()).unwrap();
    let target_head = store.head("ws").unwrap().commit.id;

    // source: catch up with main, then add y=2 and a conflicting shared.txt
    store.merge("ws", "main", "feature", &ada(), Some("sync")).unwrap();
    store.write_file("ws", "y.txt", "2", "y", &ada()).unwrap();
    store.write_file("ws", "shared.txt", "feature", "feature edit", &ada()).unwrap();

    let merged = store
        .merge("ws", "feature", "main", &GitSignature::new("Bob", "bob@example.com"), None)
        .unwrap();
    assert_eq!(merged.parent_ids, vec![target_head]);
    assert_eq!(merged.author_name, "Bob");
    assert_eq!(merged.message, "Merge branch 'feature' into main");

    let head = store.head("ws").unwrap();
    assert_eq!(head.branch.unwrap().as_str(), "main");
    assert_eq!(head.commit.id, merged.id);

    assert_eq!(text(store.read_file("ws", "x.txt").unwrap()), "1");
    assert_eq!(text(store.read_file("ws", "y.txt").unwrap()), "2");
    assert_eq!(text(store.read_file("ws", "shared.txt").unwrap()), "feature");
}

#[test]
fn merge_keeps_target_only_files() {
    let (_dir, store) = setup();
    store.create_repository("ws").unwrap();
    store.create_branch("ws", "source").unwrap();
    store.write_file("ws", "x.txt", "1", "x on main", &ada()).unwrap();

    store.merge("ws", "main", "source", &ada(), None).unwrap();
    store.write_file("ws", "y.txt", "2", "y on source", &ada()).unwrap();
    store.delete_file("ws", "x.txt", "drop x on source", &ada()).unwrap();

    store.merge("ws", "source", "main", &ada(), None).unwrap();
    // deletions on the source are not carried over
    assert_eq!(text(store.read_file("ws", "x.txt").unwrap()), "1");
    assert_eq!(text(store.read_file("ws", "y.txt").unwrap()), "2");
}

#[test]
fn merge_with_unknown_source_fails_without_commit() {
    let (_dir, store) = setup();
    store.create_repository("ws").unwrap();
    let before = store.head("ws").unwrap().commit.id;

    let err = store.merge("ws", "nope", "main", &ada(), None).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Merge);
    assert_eq!(store.head("ws").unwrap().commit.id, before);
}

#[test]
fn failed_merge_into_other_branch_keeps_head() {
    let (_dir, store) = setup();
    store.create_repository("ws").unwrap();
    store.create_branch("ws", "feature").unwrap();
    store.write_file("ws", "m.txt", "main only", "m", &ada()).unwrap();
    let before = store.head("ws").unwrap();

    let err = store.merge("ws", "ghost", "feature", &ada(), None).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Merge);

    let after = store.head("ws").unwrap();
    assert_eq!(after.branch.unwrap().as_str(), "main");
    assert_eq!(after.commit.id, before.commit.id);
    assert_eq!(text(store.read_file("ws", "m.txt").unwrap()), "main only");

    // the next write still lands on main
    let next = store.write_file("ws", "n.txt", "n", "n", &ada()).unwrap();
    assert_eq!(next.parent_ids, vec![before.commit.id]);
}

#[test]
fn unapplicable_merge_restores_previous_branch() {
    let (_dir, store) = setup();
    store.create_repository("ws").unwrap();
    store.create_branch("ws", "dst").unwrap();
    store.create_branch("ws", "src").unwrap();

    // dst holds a plain file `d`, src a directory `d/`
    store.merge("ws", "main", "dst", &ada(), None).unwrap();
    store.write_file("ws", "d", "plain", "d as file", &ada()).unwrap();
    store.merge("ws", "main", "src", &ada(), None).unwrap();
    store.write_file("ws", "d/x", "nested", "d as dir", &ada()).unwrap();

    store.merge("ws", "main", "main", &ada(), Some("back to main")).unwrap();
    store.write_file("ws", "m.txt", "main only", "m", &ada()).unwrap();
    let before = store.head("ws").unwrap().commit.id;

    let err = store.merge("ws", "src", "dst", &ada(), None).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Merge);

    let head = store.head("ws").unwrap();
    assert_eq!(head.branch.unwrap().as_str(), "main");
    assert_eq!(head.commit.id, before);
    assert_eq!(text(store.read_file("ws", "m.txt").unwrap()), "main only");
    assert!(store.read_file("ws", "d").unwrap_err().is_not_found());

    // dst itself is untouched
    assert_eq!(text(store.read_file_at("ws", "dst", "d").unwrap()), "plain");
    assert!(store.read_file_at("ws", "dst", "d/x").unwrap_err().is_not_found());
}

#[test]
fn compare_branches_reports_added_file() {
    let (_dir, store) = setup();
    store.create_repository("ws").unwrap();
    store.create_branch("ws", "base").unwrap();
    store.write_file("ws", "extra.md", "one\ntwo\n", "extra", &ada()).unwrap();

    let diff = store.diff_branches("ws", "main", "base").unwrap();
    assert_eq!(diff.stats.files_changed, 1);
    assert_eq!(diff.files[0].status, DiffStatus::Added);
    assert_eq!(diff.stats.additions, 2);

    // reversed, the same file shows up as deleted
    let diff = store.diff_branches("ws", "base", "main").unwrap();
    assert_eq!(diff.files[0].status, DiffStatus::Deleted);

    // missing target falls back to HEAD, missing source does not
    let diff = store.diff_branches("ws", "main", "missing").unwrap();
    assert!(diff.files.is_empty());
    assert!(store.diff_branches("ws", "missing", "main").unwrap_err().is_not_found());
}

#[test]
fn unchanged_write_follows_policy() {
    let dir = TempDir::new().unwrap();
    let strict = WorkspaceStore::open(StoreConfig::new(dir.path())).unwrap();
    strict.create_repository("ws").unwrap();
    strict.write_file("ws", "a.txt", "same", "m", &ada()).unwrap();

    let err = strict.write_file("ws", "a.txt", "same", "m", &ada()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Commit);
    assert_eq!(strict.list_commits("ws", 10).unwrap().len(), 2);

    let lenient =
        WorkspaceStore::open(StoreConfig::new(dir.path()).empty_commits(EmptyCommitPolicy::Allow)).unwrap();
    lenient.write_file("ws", "a.txt", "same", "m", &ada()).unwrap();
    assert_eq!(lenient.list_commits("ws", 10).unwrap().len(), 3);
}

#[test]
fn get_commit_by_hash() {
    let (_dir, store) = setup();
    store.create_repository("ws").unwrap();
    let written = store.write_file("ws", "a.txt", "x", "m", &ada()).unwrap();

    let found = store.get_commit("ws", &written.id.to_string()).unwrap();
    assert_eq!(found, written);
    assert_eq!(found.author_email, "ada@example.com");

    assert!(store.get_commit("ws", &"f".repeat(40)).unwrap_err().is_not_found());
    assert!(store.get_commit("ws", "abc").unwrap_err().is_not_found());
}

#[test]
fn concurrent_writers_each_land_a_commit() {
    let (_dir, store) = setup();
    store.create_repository("busy").unwrap();

    let store = Arc::new(store);
    let writers: Vec<_> = (0..8)
        .map(|i| {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                let path = format!("file-{}.txt", i);
                store
                    .write_file("busy", &path, format!("writer {}", i), "", &ada())
                    .unwrap()
            })
        })
        .collect();

    let mut ids: Vec<_> = writers.into_iter().map(|h| h.join().unwrap().id).collect();
    ids.sort_by_key(|id| id.to_string());
    ids.dedup();
    assert_eq!(ids.len(), 8);

    let commits = store.list_commits("busy", 100).unwrap();
    assert_eq!(commits.len(), 9);
    // a single chain: each commit's parent is the next one down
    for pair in commits.windows(2) {
        assert_eq!(pair[0].parent_ids, vec![pair[1].id]);
    }

    let files = store.list_files("busy", None).unwrap();
    assert_eq!(files.len(), 9);
}

#[test]
fn different_workspaces_do_not_block_each_other() {
    let (_dir, store) = setup();
    store.create_repository("one").unwrap();
    store.create_repository("two").unwrap();

    let impatient = store.with_timeout(Duration::from_millis(200));
    let handles: Vec<_> = ["one", "two"]
        .into_iter()
        .map(|slug| {
            let store = impatient.clone();
            thread::spawn(move || {
                for i in 0..5 {
                    store
                        .write_file(slug, "log.txt", format!("{}", i), "tick", &ada())
                        .unwrap();
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    assert_eq!(store.list_commits("one", 100).unwrap().len(), 6);
    assert_eq!(store.list_commits("two", 100).unwrap().len(), 6);
}

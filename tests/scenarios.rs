use gitlake::store::{ObjectReader, ObjectWriter};
use gitlake::{ObjectType, RawObject, Repository, RepositoryOptions};
use tempfile::TempDir;

fn open_repo() -> (TempDir, Repository) {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("repo.db");
    let repo = Repository::init_bare(&path, &RepositoryOptions::default()).unwrap();
    (dir, repo)
}

fn tree_entry(mode: &str, name: &str, sha: &gitlake::ObjectId) -> Vec<u8> {
    let mut entry = format!("{mode} {name}\0").into_bytes();
    entry.extend_from_slice(sha.as_bytes());
    entry
}

fn commit_body(tree: &gitlake::ObjectId, author_line: &str, message: &str) -> Vec<u8> {
    format!(
        "tree {}\nauthor {author_line}\ncommitter {author_line}\nencoding UTF-8\n\n{message}",
        tree.to_hex()
    )
    .into_bytes()
}

#[test]
fn s1_single_commit_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("repo.db");

    let (commit_id, message) = {
        let repo = Repository::init_bare(&path, &RepositoryOptions::default()).unwrap();
        let blob_id = repo
            .object_store()
            .insert(&RawObject::new(ObjectType::Blob, b"hello world\n".to_vec()))
            .unwrap();

        let tree_data = tree_entry("100644", "greeting.txt", &blob_id);
        let tree_id = repo
            .object_store()
            .insert(&RawObject::new(ObjectType::Tree, tree_data))
            .unwrap();

        let message = "Initial commit";
        let commit_data = commit_body(&tree_id, "Alice <a@x> 1700000000 +0000", message);
        let commit_id = repo
            .object_store()
            .insert(&RawObject::new(ObjectType::Commit, commit_data))
            .unwrap();

        repo.refs()
            .add_if_new(
                b"refs/heads/main",
                commit_id.as_bytes(),
                gitlake::refs::RefLogOptions {
                    message: Some(b"branch main created"),
                    ..Default::default()
                },
            )
            .unwrap();
        repo.refs()
            .set_symbolic_ref(
                b"HEAD",
                b"refs/heads/main",
                gitlake::refs::RefLogOptions {
                    message: Some(b"set HEAD"),
                    ..Default::default()
                },
            )
            .unwrap();

        (commit_id, message.to_string())
    };

    let repo = Repository::open(&path).unwrap();
    let head = repo.get_named_file("HEAD").unwrap().unwrap();
    assert_eq!(head, b"ref: refs/heads/main\n");

    let main = repo.refs().read_loose_ref(b"refs/heads/main").unwrap().unwrap();
    assert_eq!(main, commit_id.as_bytes().to_vec());

    let commit = repo.object_store().get_raw(commit_id).unwrap();
    assert_eq!(commit.type_num, ObjectType::Commit);
    let body = String::from_utf8(commit.data).unwrap();
    assert!(body.ends_with(&message));
}

#[test]
fn s2_chunked_blob_round_trips_and_is_marked_chunked() {
    let (_dir, repo) = open_repo();
    let mut data = Vec::new();
    for n in 0..500 {
        data.extend_from_slice(format!("line {n} of the file\n").as_bytes());
    }

    let id = repo
        .object_store()
        .insert(&RawObject::new(ObjectType::Blob, data.clone()))
        .unwrap();

    let fetched = repo.object_store().get_raw(id).unwrap();
    assert_eq!(fetched.data, data);

    let size = repo.object_store().get_object_size(id).unwrap();
    assert_eq!(size as usize, data.len());
}

#[test]
fn s3_shared_prefix_chunks_are_deduplicated() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("repo.db");
    let repo = Repository::init_bare(&path, &RepositoryOptions::default()).unwrap();

    let shared = vec![b'S'; 20_000];
    let mut a = shared.clone();
    a.extend_from_slice(b"unique-tail-for-blob-a-long-enough-to-be-distinct");
    let mut b = shared;
    b.extend_from_slice(b"unique-tail-for-blob-b-long-enough-to-differ-here");

    repo.object_store()
        .insert(&RawObject::new(ObjectType::Blob, a))
        .unwrap();
    repo.object_store()
        .insert(&RawObject::new(ObjectType::Blob, b))
        .unwrap();
    drop(repo);

    let conn = rusqlite::Connection::open(&path).unwrap();
    let chunk_count: i64 = conn.query_row("SELECT COUNT(*) FROM chunks", [], |row| row.get(0)).unwrap();

    let refs_lengths: Vec<i64> = {
        let mut stmt = conn
            .prepare("SELECT chunk_refs FROM objects WHERE chunk_refs IS NOT NULL")
            .unwrap();
        stmt.query_map([], |row| row.get::<_, Vec<u8>>(0))
            .unwrap()
            .map(|packed| gitlake::chunkref::unpack_chunk_refs(&packed.unwrap()).len() as i64)
            .collect()
    };
    let total_refs: i64 = refs_lengths.iter().sum();

    assert!(chunk_count > 0);
    assert!(chunk_count < total_refs);
}

#[test]
fn s4_range_read_extracts_needle() {
    let (_dir, repo) = open_repo();
    let mut data = vec![b'A'; 5000];
    data.extend_from_slice(b"NEEDLE");
    data.extend_from_slice(&vec![b'B'; 50_000]);

    let id = repo
        .object_store()
        .insert(&RawObject::new(ObjectType::Blob, data))
        .unwrap();

    let (_, slice) = repo.object_store().get_raw_range(id, 5000, 6).unwrap();
    assert_eq!(slice, b"NEEDLE");
}

#[test]
fn s5_cas_race_exactly_one_winner() {
    let (_dir, repo) = open_repo();
    let old = [b'a'; 20];
    repo.refs()
        .add_if_new(
            b"refs/heads/main",
            &old,
            gitlake::refs::RefLogOptions {
                message: Some(b"seed"),
                ..Default::default()
            },
        )
        .unwrap();

    let winner_b = repo
        .refs()
        .set_if_equals(
            b"refs/heads/main",
            Some(&old),
            &[b'b'; 20],
            gitlake::refs::RefLogOptions {
                message: Some(b"worker b"),
                ..Default::default()
            },
        )
        .unwrap();
    let winner_c = repo
        .refs()
        .set_if_equals(
            b"refs/heads/main",
            Some(&old),
            &[b'c'; 20],
            gitlake::refs::RefLogOptions {
                message: Some(b"worker c"),
                ..Default::default()
            },
        )
        .unwrap();

    assert_ne!(winner_b, winner_c);
    let final_value = repo.refs().read_loose_ref(b"refs/heads/main").unwrap().unwrap();
    if winner_b {
        assert_eq!(final_value, vec![b'b'; 20]);
    } else {
        assert_eq!(final_value, vec![b'c'; 20]);
    }
}

#[test]
fn s6_legacy_blob_readable_after_retraining_dictionary() {
    let (_dir, repo) = open_repo();
    repo.enable_compression("zstd").unwrap();

    for n in 0..20 {
        let data = format!("tree {:040x}\nauthor a <a@x> {n} +0000\n", n).into_bytes();
        repo.object_store()
            .insert(&RawObject::new(ObjectType::Commit, data))
            .unwrap();
    }
    repo.train_dictionary(gitlake::codec::DictionaryKey::Commit, 8192).unwrap();

    let original = b"tree 0000000000000000000000000000000000000000\nauthor a <a@x> 0 +0000\n".to_vec();
    let original_id = repo
        .object_store()
        .insert(&RawObject::new(ObjectType::Commit, original.clone()))
        .unwrap();

    for n in 100..140 {
        let data = format!("tree {:040x}\nauthor b <b@y> {n} +0000\nextra padding here\n", n).into_bytes();
        repo.object_store()
            .insert(&RawObject::new(ObjectType::Commit, data))
            .unwrap();
    }
    repo.train_dictionary(gitlake::codec::DictionaryKey::Commit, 8192).unwrap();

    let fetched = repo.object_store().get_raw(original_id).unwrap();
    assert_eq!(fetched.data, original);
}

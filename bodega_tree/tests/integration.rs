//! End-to-end engine tests on the in-memory backends.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use bodega_core::{AuthorizationGrant, Permission, etag};
use bodega_index_memory::MemoryIndex;
use bodega_store_memory::MemoryStore;
use bodega_tree::{
    GetOutcome, ListOutcome, Listing, Preconditions, PutOutcome, PutRequest, Storage,
};
use bytes::Bytes;

fn storage() -> Storage {
    Storage::new(Arc::new(MemoryIndex::new()), Arc::new(MemoryStore::new()))
}

fn put(body: &str, content_type: &str) -> PutRequest {
    PutRequest {
        body: Bytes::copy_from_slice(body.as_bytes()),
        content_type: content_type.to_string(),
        content_range: None,
        preconditions: Preconditions::default(),
    }
}

fn if_match(header: &str) -> Preconditions {
    Preconditions {
        if_match: Some(header.to_string()),
        if_none_match: None,
    }
}

fn if_none_match(header: &str) -> Preconditions {
    Preconditions {
        if_match: None,
        if_none_match: Some(header.to_string()),
    }
}

async fn listing(storage: &Storage, user: &str, directory: &str) -> Listing {
    match storage
        .get_listing(user, directory, &Preconditions::default())
        .await
        .unwrap()
    {
        ListOutcome::Listed(listing) => listing,
        ListOutcome::NotModified { .. } => panic!("no preconditions were sent"),
    }
}

async fn fetch_body(storage: &Storage, user: &str, path: &str) -> Bytes {
    match storage
        .get_document(user, path, &Preconditions::default())
        .await
        .unwrap()
    {
        GetOutcome::Fetched(doc) => doc.body,
        GetOutcome::NotModified { .. } => panic!("no preconditions were sent"),
    }
}

#[tokio::test]
async fn create_then_update_statuses() {
    let storage = storage();

    let created = storage
        .put_document("ana", "menu", put("v1", "text/plain"))
        .await
        .unwrap();
    assert_eq!(created.status(), 201);
    assert!(matches!(created, PutOutcome::Created { .. }));

    let updated = storage
        .put_document("ana", "menu", put("v2", "text/plain"))
        .await
        .unwrap();
    assert_eq!(updated.status(), 200);
    assert_ne!(created.etag(), updated.etag());

    assert_eq!(fetch_body(&storage, "ana", "menu").await, "v2");
}

#[tokio::test]
async fn quota_tracks_sizes_through_rewrites_and_deletes() {
    let storage = storage();

    storage
        .put_document("ana", "a", put("12345", "text/plain"))
        .await
        .unwrap();
    storage
        .put_document("ana", "b/c", put("123", "text/plain"))
        .await
        .unwrap();
    assert_eq!(storage.quota_used("ana").await.unwrap(), 8);

    storage
        .put_document("ana", "a", put("1234567", "text/plain"))
        .await
        .unwrap();
    assert_eq!(storage.quota_used("ana").await.unwrap(), 10);

    storage
        .delete_document("ana", "b/c", &Preconditions::default())
        .await
        .unwrap();
    assert_eq!(storage.quota_used("ana").await.unwrap(), 7);

    assert_eq!(
        storage.quota_used("bob").await.unwrap(),
        0,
        "users are isolated"
    );
}

#[tokio::test]
async fn listings_render_documents_and_directories() {
    let storage = storage();
    storage
        .put_document("ana", "food/tacos", put("al pastor", "text/markdown"))
        .await
        .unwrap();
    storage
        .put_document("ana", "food/salsas/verde", put("tomatillo", "text/plain"))
        .await
        .unwrap();

    let listing = listing(&storage, "ana", "food/").await;
    let value: serde_json::Value = serde_json::from_str(&listing.to_json().unwrap()).unwrap();

    assert_eq!(value.as_object().unwrap().len(), 2);
    assert_eq!(
        value["tacos"]["ETag"].as_str(),
        Some(etag::document(b"al pastor").as_str())
    );
    assert_eq!(value["tacos"]["Content-Type"], "text/markdown");
    assert_eq!(value["tacos"]["Content-Length"], 9);
    assert!(value["salsas/"]["ETag"].is_string());
    assert!(value["salsas/"].get("Content-Type").is_none());
    assert!(value["salsas/"].get("Content-Length").is_none());
}

#[tokio::test]
async fn conditional_reads_short_circuit() {
    let storage = storage();
    let outcome = storage
        .put_document("ana", "menu", put("tacos al pastor", "text/plain"))
        .await
        .unwrap();
    let tag = outcome.etag().to_string();

    // Exact, quoted, weak, stray-quote and wildcard forms all revalidate.
    for header in [
        tag.clone(),
        format!("\"{tag}\""),
        format!("W/\"{tag}\""),
        format!("\"W/{tag}\""),
        "*".to_string(),
        format!("\"other\", \"{tag}\""),
    ] {
        let got = storage
            .get_document("ana", "menu", &if_none_match(&header))
            .await
            .unwrap();
        assert_eq!(got.status(), 304, "header {header:?} should revalidate");
        match got {
            GetOutcome::NotModified { etag } => assert_eq!(etag, tag),
            GetOutcome::Fetched(_) => unreachable!(),
        }
    }

    let got = storage
        .get_document("ana", "menu", &if_none_match("\"stale\""))
        .await
        .unwrap();
    assert_eq!(got.status(), 200);
    match got {
        GetOutcome::Fetched(doc) => {
            assert_eq!(doc.body, Bytes::from_static(b"tacos al pastor"));
            assert_eq!(doc.content_type, "text/plain");
            assert_eq!(doc.etag, tag);
            assert!(doc.modified > 0);
        }
        GetOutcome::NotModified { .. } => panic!("expected a body"),
    }
}

#[tokio::test]
async fn listings_revalidate_even_when_never_written() {
    let storage = storage();

    let fresh = listing(&storage, "ana", "ghost/").await;
    assert!(fresh.items.is_empty());

    let outcome = storage
        .get_listing("ana", "ghost/", &if_none_match(&format!("\"{}\"", fresh.etag)))
        .await
        .unwrap();
    assert_eq!(outcome.status(), 304, "synthetic tags revalidate too");

    let second = listing(&storage, "ana", "ghost/").await;
    assert_eq!(second.etag, fresh.etag, "synthetic tags are stable");
}

#[tokio::test]
async fn listing_reads_revalidate_against_current_revision() {
    let storage = storage();
    storage
        .put_document("ana", "food/tacos", put("v1", "text/plain"))
        .await
        .unwrap();

    // Directory tags revalidate in quoted, weak, stray-quote and list
    // forms, same as document tags.
    let before = listing(&storage, "ana", "food/").await.etag;
    for header in [
        format!("\"{before}\""),
        format!("W/\"{before}\""),
        format!("\"W/{before}\""),
        format!("\"stale\", W/\"{before}\""),
    ] {
        let outcome = storage
            .get_listing("ana", "food/", &if_none_match(&header))
            .await
            .unwrap();
        assert_eq!(outcome.status(), 304, "header {header:?} should revalidate");
        match outcome {
            ListOutcome::NotModified { etag } => assert_eq!(etag, before),
            ListOutcome::Listed(_) => unreachable!(),
        }
    }

    storage
        .put_document("ana", "food/tortas", put("v2", "text/plain"))
        .await
        .unwrap();
    let outcome = storage
        .get_listing("ana", "food/", &if_none_match(&format!("W/\"{before}\"")))
        .await
        .unwrap();
    assert_eq!(outcome.status(), 200, "the revision moved on");
}

#[tokio::test]
async fn if_match_guards_writes_and_deletes() {
    let storage = storage();
    let created = storage
        .put_document("ana", "menu", put("v1", "text/plain"))
        .await
        .unwrap();
    let tag = created.etag().to_string();

    let stale = PutRequest {
        preconditions: if_match("\"stale\""),
        ..put("v2", "text/plain")
    };
    let err = storage.put_document("ana", "menu", stale).await.unwrap_err();
    assert_eq!(err.http_status(), 412);
    assert_eq!(fetch_body(&storage, "ana", "menu").await, "v1");

    let guarded = PutRequest {
        preconditions: if_match(&format!("\"{tag}\"")),
        ..put("v2", "text/plain")
    };
    let updated = storage.put_document("ana", "menu", guarded).await.unwrap();
    assert_eq!(updated.status(), 200);

    let err = storage
        .delete_document("ana", "menu", &if_match(&format!("\"{tag}\"")))
        .await
        .unwrap_err();
    assert_eq!(err.http_status(), 412, "the tag went stale");

    storage
        .delete_document("ana", "menu", &if_match(&format!("\"{}\"", updated.etag())))
        .await
        .unwrap();
}

#[tokio::test]
async fn if_match_star_requires_existence() {
    let storage = storage();
    let must_exist = PutRequest {
        preconditions: if_match("*"),
        ..put("v", "text/plain")
    };
    let err = storage
        .put_document("ana", "ghost", must_exist)
        .await
        .unwrap_err();
    assert_eq!(err.http_status(), 412);
}

#[tokio::test]
async fn if_none_match_star_creates_only_once() {
    let storage = storage();
    let create_only = || PutRequest {
        preconditions: if_none_match("*"),
        ..put("v", "text/plain")
    };

    let outcome = storage
        .put_document("ana", "menu", create_only())
        .await
        .unwrap();
    assert_eq!(outcome.status(), 201);

    let err = storage
        .put_document("ana", "menu", create_only())
        .await
        .unwrap_err();
    assert_eq!(err.http_status(), 412);
}

#[tokio::test]
async fn collisions_are_rejected_in_both_directions() {
    let storage = storage();
    storage
        .put_document("ana", "food/tacos", put("v", "text/plain"))
        .await
        .unwrap();

    // A document where a directory already exists.
    let err = storage
        .put_document("ana", "food", put("v", "text/plain"))
        .await
        .unwrap_err();
    assert_eq!(err.http_status(), 409);

    // A write that needs a directory where a document already exists.
    let err = storage
        .put_document("ana", "food/tacos/extra", put("v", "text/plain"))
        .await
        .unwrap_err();
    assert_eq!(err.http_status(), 409);

    // Siblings and other users stay unaffected.
    storage
        .put_document("ana", "food/tortas", put("v", "text/plain"))
        .await
        .unwrap();
    storage
        .put_document("bob", "food", put("v", "text/plain"))
        .await
        .unwrap();
}

#[tokio::test]
async fn delete_cascades_through_emptied_ancestors() {
    let storage = storage();
    storage
        .put_document("ana", "food/salsas/verde", put("v", "text/plain"))
        .await
        .unwrap();
    storage
        .put_document("ana", "food/tacos", put("t", "text/plain"))
        .await
        .unwrap();

    storage
        .delete_document("ana", "food/salsas/verde", &Preconditions::default())
        .await
        .unwrap();

    let food = listing(&storage, "ana", "food/").await;
    assert!(food.items.contains_key("tacos"));
    assert!(
        !food.items.contains_key("salsas/"),
        "the emptied directory must vanish from its parent"
    );
    assert!(listing(&storage, "ana", "").await.items.contains_key("food/"));

    storage
        .delete_document("ana", "food/tacos", &Preconditions::default())
        .await
        .unwrap();

    assert!(listing(&storage, "ana", "").await.items.is_empty());
    assert!(
        listing(&storage, "ana", "food/").await.items.is_empty(),
        "the whole chain emptied out"
    );
}

#[tokio::test]
async fn delete_refreshes_surviving_ancestors() {
    let storage = storage();
    storage
        .put_document("ana", "food/tacos", put("t", "text/plain"))
        .await
        .unwrap();
    storage
        .put_document("ana", "food/tortas", put("x", "text/plain"))
        .await
        .unwrap();

    let food_before = listing(&storage, "ana", "food/").await.etag;
    let root_before = listing(&storage, "ana", "").await.etag;

    let receipt = storage
        .delete_document("ana", "food/tortas", &Preconditions::default())
        .await
        .unwrap();
    assert_eq!(receipt.etag, etag::document(b"x"));

    let food = listing(&storage, "ana", "food/").await;
    assert_ne!(food.etag, food_before, "surviving parent gets a new revision");
    assert!(food.items.contains_key("tacos"));
    assert_ne!(listing(&storage, "ana", "").await.etag, root_before);
}

#[tokio::test]
async fn visible_rewrites_refresh_every_ancestor() {
    let storage = storage();
    storage
        .put_document("ana", "food/salsas/verde", put("v1", "text/plain"))
        .await
        .unwrap();

    let mut before = Vec::new();
    for dir in ["", "food/", "food/salsas/"] {
        before.push(listing(&storage, "ana", dir).await.etag);
    }

    storage
        .put_document("ana", "food/salsas/verde", put("v2", "text/plain"))
        .await
        .unwrap();

    for (dir, old) in ["", "food/", "food/salsas/"].iter().zip(before) {
        assert_ne!(
            listing(&storage, "ana", dir).await.etag,
            old,
            "revision of {dir:?} must move with the write"
        );
    }
}

#[tokio::test]
async fn identical_rewrites_leave_ancestors_untouched() {
    let storage = storage();
    storage
        .put_document("ana", "food/tacos", put("al pastor", "text/plain"))
        .await
        .unwrap();

    let food_before = listing(&storage, "ana", "food/").await.etag;
    let root_before = listing(&storage, "ana", "").await.etag;
    let quota_before = storage.quota_used("ana").await.unwrap();

    let outcome = storage
        .put_document("ana", "food/tacos", put("al pastor", "text/plain"))
        .await
        .unwrap();
    assert_eq!(outcome.status(), 200, "the rewrite itself still succeeds");

    assert_eq!(listing(&storage, "ana", "food/").await.etag, food_before);
    assert_eq!(listing(&storage, "ana", "").await.etag, root_before);
    assert_eq!(storage.quota_used("ana").await.unwrap(), quota_before);
}

#[tokio::test]
async fn malformed_requests_are_rejected_up_front() {
    let storage = storage();

    let ranged = PutRequest {
        content_range: Some("bytes 0-4/10".to_string()),
        ..put("x", "text/plain")
    };
    let err = storage.put_document("ana", "menu", ranged).await.unwrap_err();
    assert_eq!(err.http_status(), 400);

    let err = storage
        .put_document("ana", "menu", put("x", "not a media type"))
        .await
        .unwrap_err();
    assert_eq!(err.http_status(), 415);

    for path in ["food//x", "../menu", "food/", ""] {
        let err = storage
            .put_document("ana", path, put("x", "text/plain"))
            .await
            .unwrap_err();
        assert_eq!(err.http_status(), 400, "path {path:?} is not writable");
    }

    assert_eq!(
        storage.quota_used("ana").await.unwrap(),
        0,
        "nothing was written"
    );
}

#[tokio::test]
async fn missing_paths_read_as_not_found() {
    let storage = storage();

    let err = storage
        .get_document("ana", "ghost", &Preconditions::default())
        .await
        .unwrap_err();
    assert_eq!(err.http_status(), 404);

    let err = storage
        .get_document("ana", "ghost/", &Preconditions::default())
        .await
        .unwrap_err();
    assert_eq!(err.http_status(), 404, "directory paths are not documents");

    let err = storage
        .delete_document("ana", "ghost", &Preconditions::default())
        .await
        .unwrap_err();
    assert_eq!(err.http_status(), 404);

    let err = storage
        .get_listing("ana", "no-slash", &Preconditions::default())
        .await
        .unwrap_err();
    assert_eq!(err.http_status(), 404, "documents are not directories");
}

#[tokio::test]
async fn tokens_gate_access_by_scope() {
    let storage = storage();
    storage
        .provision_token(
            "ana",
            "tok-food",
            &[AuthorizationGrant::parse("food:rw").unwrap()],
        )
        .await
        .unwrap();
    storage
        .provision_token("ana", "tok-read", &[AuthorizationGrant::parse(":r").unwrap()])
        .await
        .unwrap();

    assert!(
        storage
            .authorize("ana", "tok-food", "food/tacos", Permission::ReadWrite)
            .await
            .unwrap()
    );
    assert!(
        !storage
            .authorize("ana", "tok-food", "drinks/mate", Permission::Read)
            .await
            .unwrap(),
        "out-of-scope paths stay closed"
    );
    assert!(
        storage
            .authorize("ana", "tok-read", "drinks/mate", Permission::Read)
            .await
            .unwrap()
    );
    assert!(
        !storage
            .authorize("ana", "tok-read", "drinks/mate", Permission::ReadWrite)
            .await
            .unwrap(),
        "read tokens never write"
    );
    assert!(
        !storage
            .authorize("ana", "unknown", "food/tacos", Permission::Read)
            .await
            .unwrap(),
        "unknown tokens have no grants"
    );
    assert!(
        !storage
            .authorize("bob", "tok-food", "food/tacos", Permission::Read)
            .await
            .unwrap(),
        "tokens do not cross users"
    );
}

fn expected_children(model: &BTreeMap<&str, String>, dir: &str) -> BTreeSet<String> {
    let mut names = BTreeSet::new();
    for path in model.keys() {
        let Some(rest) = path.strip_prefix(dir) else {
            continue;
        };
        if rest.is_empty() {
            continue;
        }
        match rest.split_once('/') {
            Some((first, _)) => {
                names.insert(format!("{first}/"));
            }
            None => {
                names.insert(rest.to_string());
            }
        }
    }
    names
}

#[tokio::test]
async fn randomized_churn_matches_a_shadow_model() {
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    let storage = storage();
    let mut rng = StdRng::seed_from_u64(0xB0DE6A);
    let universe = [
        "menu",
        "specials",
        "food/tacos",
        "food/tortas",
        "food/salsas/verde",
        "food/salsas/roja",
        "drinks/agua",
    ];
    let mut model: BTreeMap<&str, String> = BTreeMap::new();

    for round in 0..200 {
        let path = universe[rng.random_range(0..universe.len())];
        if rng.random_bool(0.35) {
            match storage
                .delete_document("ana", path, &Preconditions::default())
                .await
            {
                Ok(receipt) => {
                    let body = model
                        .remove(path)
                        .expect("engine deleted a path the model does not hold");
                    assert_eq!(receipt.etag, etag::document(body.as_bytes()));
                }
                Err(err) => {
                    assert_eq!(err.http_status(), 404);
                    assert!(
                        !model.contains_key(path),
                        "engine refused a delete the model allows"
                    );
                }
            }
        } else {
            let body = format!("body {round} for {path}");
            let outcome = storage
                .put_document("ana", path, put(&body, "text/plain"))
                .await
                .unwrap();
            let expected = if model.contains_key(path) { 200 } else { 201 };
            assert_eq!(outcome.status(), expected);
            model.insert(path, body);
        }
    }

    let expected_quota: i64 = model.values().map(|body| body.len() as i64).sum();
    assert_eq!(storage.quota_used("ana").await.unwrap(), expected_quota);

    for (path, body) in &model {
        assert_eq!(
            fetch_body(&storage, "ana", path).await,
            Bytes::copy_from_slice(body.as_bytes())
        );
    }

    for dir in ["", "food/", "food/salsas/", "drinks/"] {
        let actual: BTreeSet<String> = listing(&storage, "ana", dir)
            .await
            .items
            .into_keys()
            .collect();
        assert_eq!(
            actual,
            expected_children(&model, dir),
            "listing of {dir:?} diverged from the model"
        );
    }
}

#[tokio::test]
async fn randomized_overlaps_never_break_tree_shape() {
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    let storage = storage();
    let mut rng = StdRng::seed_from_u64(0xCAC705);
    // Every name here shadows or is shadowed by another, so writes keep
    // contending for the same slots as documents and as directories.
    let universe = [
        "menu",
        "menu/tacos",
        "menu/tacos/al_pastor",
        "menu/salsas",
        "drinks",
        "drinks/agua",
        "drinks/agua/fresca",
    ];
    let mut model: BTreeMap<&str, String> = BTreeMap::new();

    for round in 0..200 {
        let path = universe[rng.random_range(0..universe.len())];
        if rng.random_bool(0.3) {
            match storage
                .delete_document("ana", path, &Preconditions::default())
                .await
            {
                Ok(receipt) => {
                    let body = model
                        .remove(path)
                        .expect("engine deleted a path the model does not hold");
                    assert_eq!(receipt.etag, etag::document(body.as_bytes()));
                }
                Err(err) => {
                    assert_eq!(err.http_status(), 404);
                    assert!(!model.contains_key(path));
                }
            }
        } else {
            let blocked = model.keys().any(|held| {
                held.starts_with(&format!("{path}/")) || path.starts_with(&format!("{held}/"))
            });
            let body = format!("round {round}");
            match storage
                .put_document("ana", path, put(&body, "text/plain"))
                .await
            {
                Ok(outcome) => {
                    assert!(
                        !blocked,
                        "write to {path} landed while another entry shadows it"
                    );
                    let expected = if model.contains_key(path) { 200 } else { 201 };
                    assert_eq!(outcome.status(), expected);
                    model.insert(path, body);
                }
                Err(err) => {
                    assert_eq!(err.http_status(), 409);
                    assert!(blocked, "write to {path} was refused with nothing in its way");
                }
            }
        }
    }

    // No name may read back as both a document and a directory.
    for path in universe {
        let as_document = storage
            .get_document("ana", path, &Preconditions::default())
            .await;
        let as_directory = listing(&storage, "ana", &format!("{path}/")).await;
        if model.contains_key(path) {
            assert!(as_document.is_ok(), "{path} is held but does not read back");
            assert!(
                as_directory.items.is_empty(),
                "{path} reads as both a document and a directory"
            );
        } else {
            assert_eq!(as_document.unwrap_err().http_status(), 404);
        }
    }

    for dir in ["", "menu/", "menu/tacos/", "drinks/", "drinks/agua/"] {
        let actual: BTreeSet<String> = listing(&storage, "ana", dir)
            .await
            .items
            .into_keys()
            .collect();
        assert_eq!(
            actual,
            expected_children(&model, dir),
            "listing of {dir:?} diverged from the model"
        );
    }

    let expected_quota: i64 = model.values().map(|body| body.len() as i64).sum();
    assert_eq!(storage.quota_used("ana").await.unwrap(), expected_quota);
}

//! User repository tests against the JSON file driver.

use std::path::PathBuf;
use std::sync::Arc;

use tokio_test::{assert_err, assert_ok};
use uuid::Uuid;

use common::{AppError, RetryConfig, StoreBackend};
use domain::{NewUser, User};
use user_service_lib::build_user_service;
use user_service_lib::config::UserServiceConfig;
use user_service_lib::repository::{UserRepository, UserStore};
use user_service_lib::service::UserService;
use user_service_lib::store::{JsonFileStore, RecordStore};

fn temp_file() -> PathBuf {
    std::env::temp_dir()
        .join(format!("user-repo-{}", Uuid::new_v4()))
        .join("users.json")
}

async fn json_repo(path: PathBuf) -> UserStore {
    let store = JsonFileStore::<User>::open(path).await.unwrap();
    UserStore::new(Arc::new(store))
}

#[tokio::test]
async fn test_empty_store_lists_nothing() {
    let repo = json_repo(temp_file()).await;

    let users = assert_ok!(repo.get_all().await);
    assert!(users.is_empty());
}

#[tokio::test]
async fn test_register_twice_scenario() {
    let repo = json_repo(temp_file()).await;

    let alice = assert_ok!(repo.create(NewUser::new("alice", "hash-of-secret1")).await);
    assert!(!alice.id.is_empty());

    let again = repo.create(NewUser::new("alice", "hash-of-secret2")).await;
    assert!(matches!(again, Err(AppError::AlreadyExists(_))));

    let found = assert_ok!(repo.find_by_username("alice").await);
    assert_eq!(found, alice);
    assert_eq!(found.password, "hash-of-secret1");

    assert_eq!(assert_ok!(repo.get_all().await).len(), 1);
}

#[tokio::test]
async fn test_distinct_users_get_distinct_ids() {
    let repo = json_repo(temp_file()).await;

    let alice = assert_ok!(repo.create(NewUser::new("alice", "h1")).await);
    let bob = assert_ok!(repo.create(NewUser::new("bob", "h2")).await);

    assert_ne!(alice.id, bob.id);
    assert_eq!(assert_ok!(repo.find_by_id(&bob.id).await), bob);
}

#[tokio::test]
async fn test_lookup_errors() {
    let repo = json_repo(temp_file()).await;
    assert_ok!(repo.create(NewUser::new("alice", "h1")).await);

    let invalid = repo.find_by_id("not-a-valid-id").await;
    assert!(matches!(invalid, Err(AppError::InvalidId(_))));

    let missing = repo.find_by_id(&Uuid::new_v4().to_string()).await;
    assert!(matches!(missing, Err(AppError::NotFound)));

    let unknown = repo.find_by_username("bob").await;
    assert!(matches!(unknown, Err(AppError::NotFound)));
}

#[tokio::test]
async fn test_users_survive_reopen() {
    let path = temp_file();
    let alice = {
        let repo = json_repo(path.clone()).await;
        assert_ok!(repo.create(NewUser::new("alice", "h1")).await)
    };

    let reopened = json_repo(path).await;
    assert_eq!(assert_ok!(reopened.find_by_username("alice").await), alice);
}

#[tokio::test]
async fn test_legacy_file_with_duplicates_and_xid_ids() {
    let path = temp_file();
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(
        &path,
        r#"[
            {"id": "9m4e2mr0ui3e8a215n4g", "username": "alice", "password": "h1"},
            {"id": "9m4e2mr0ui3e8a215n50", "username": "alice", "password": "h2"}
        ]"#,
    )
    .unwrap();
    let repo = json_repo(path).await;

    let bob = assert_ok!(repo.create(NewUser::new("bob", "h3")).await);
    assert_eq!(assert_ok!(repo.find_by_username("bob").await), bob);
    assert_err!(repo.create(NewUser::new("alice", "h4")).await);

    let first = assert_ok!(repo.find_by_id("9m4e2mr0ui3e8a215n4g").await);
    assert_eq!(first.username, "alice");
    assert_eq!(first.password, "h1");
    assert_eq!(assert_ok!(repo.get_all().await).len(), 3);
}

#[tokio::test]
async fn test_concurrent_creates_keep_usernames_unique() {
    let repo = Arc::new(json_repo(temp_file()).await);

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let repo = repo.clone();
            tokio::spawn(async move { repo.create(NewUser::new("alice", format!("h{}", i))).await })
        })
        .collect();

    let mut created = 0;
    for handle in handles {
        if handle.await.unwrap().is_ok() {
            created += 1;
        }
    }

    assert_eq!(created, 1);
    assert_eq!(assert_ok!(repo.get_all().await).len(), 1);
}

#[tokio::test]
async fn test_backend_constraint_rejects_direct_duplicate() {
    let store = JsonFileStore::<User>::open(temp_file()).await.unwrap();
    let first = User::from_new(store.new_id(), NewUser::new("alice", "h1"));
    let second = User::from_new(store.new_id(), NewUser::new("alice", "h2"));

    assert_ok!(store.create(&first).await);
    assert_err!(store.create(&second).await);
}

#[tokio::test]
async fn test_build_user_service_over_json() {
    let config = UserServiceConfig {
        backend: StoreBackend::Json { path: temp_file() },
        retry: RetryConfig::default(),
    };

    let service = assert_ok!(build_user_service(&config).await);
    assert_eq!(service.backend(), "json");

    let user = assert_ok!(service.create_user(NewUser::new("alice", "h1")).await);
    assert_eq!(assert_ok!(service.get_user(&user.id).await), user);
    assert_eq!(assert_ok!(service.list_users().await), vec![user]);
    assert_ok!(service.ping().await);
}

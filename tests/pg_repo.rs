#![cfg(feature = "postgres-store")]

use std::sync::Arc;

use quire::config::EngineConfig;
use quire::models::{new_id, Comment, Post};
use quire::repo::pg::PgRepo;
use quire::repo::{PostRepo, RepoError};
use quire::ContentService;
use sqlx::postgres::PgPoolOptions;

async fn repo() -> Option<PgRepo> {
    let url = std::env::var("DATABASE_URL").ok()?;
    let pool = PgPoolOptions::new()
        .max_connections(2)
        .acquire_timeout(std::time::Duration::from_secs(5))
        .connect(&url)
        .await
        .ok()?;
    let repo = PgRepo::new(pool);
    repo.migrate().await.ok()?;
    Some(repo)
}

// tables are shared between runs, so every slug carries a fresh suffix
fn unique(prefix: &str) -> String {
    format!("{prefix}-{}", new_id())
}

#[tokio::test]
async fn slug_index_rejects_duplicates() {
    let Some(repo) = repo().await else {
        eprintln!("skip: no DATABASE_URL");
        return;
    };
    let slug = unique("dup");
    let a = Post { id: new_id(), ..Post::new("A", slug.clone(), "a") };
    repo.insert_post(a.clone()).await.unwrap();

    let b = Post { id: new_id(), ..Post::new("B", slug.clone(), "b") };
    assert_eq!(repo.insert_post(b).await.unwrap_err(), RepoError::Conflict);
    assert!(!repo.slug_taken(&slug, Some(&a.id)).await.unwrap());

    repo.delete_post(&a.id).await.unwrap();
    assert_eq!(repo.delete_post(&a.id).await.unwrap_err(), RepoError::NotFound);
}

#[tokio::test]
async fn service_round_trip_on_postgres() {
    let Some(repo) = repo().await else {
        eprintln!("skip: no DATABASE_URL");
        return;
    };
    let s = ContentService::new(Arc::new(repo), EngineConfig::default());
    let slug = unique("pg");

    let first = s.save_post(Post::new("One", slug.clone(), "one"), vec![]).await.unwrap();
    let second = s.save_post(Post::new("Two", slug.clone(), "two"), vec![]).await.unwrap();
    assert_eq!(first.slug, slug);
    assert_eq!(second.slug, format!("{slug}-1"));

    let reply = |parent: &str, content: &str| Comment {
        post_id: first.id.clone(),
        parent: parent.into(),
        author: "Ada".into(),
        email: "ada@example.com".into(),
        content: content.into(),
        approved: true,
        ..Default::default()
    };
    let root = s.save_comment(reply("", "root")).await.unwrap();
    let child1 = s.save_comment(reply(&root.id, "child1")).await.unwrap();
    let child2 = s.save_comment(reply(&child1.id, "child2")).await.unwrap();

    let threads = s.comments_for_post(&first.id).await.unwrap();
    assert_eq!(threads[0].children[0].id, child1.id);
    assert_eq!(threads[0].children[0].children[0].id, child2.id);

    assert_eq!(s.delete_post(&first.id).await.unwrap(), 3);
    s.delete_post(&second.id).await.unwrap();
    assert!(s.get_comment(&root.id).await.is_err());
}

#[tokio::test]
async fn users_and_messages_on_postgres() {
    let Some(repo) = repo().await else {
        eprintln!("skip: no DATABASE_URL");
        return;
    };
    let s = ContentService::new(Arc::new(repo), EngineConfig::default());
    let email = format!("{}@example.com", new_id());

    let u = s.create_user(&email, "Pg User", "secret").await.unwrap();
    assert!(s.check_password(&email, "secret").await.unwrap());
    assert_eq!(s.create_user(&email, "Again", "secret").await.unwrap_err(), quire::ContentError::Conflict);
    assert_eq!(s.user_by_slug(&u.slug).await.unwrap().id, u.id);

    let post = s.save_post(Post::new("Inbox", unique("inbox"), ""), vec![]).await.unwrap();
    s.save_comment(Comment {
        post_id: post.id.clone(),
        author: "Ada".into(),
        email: "ada@example.com".into(),
        content: "ping".into(),
        ..Default::default()
    })
    .await
    .unwrap();
    let msg = s
        .unread_messages()
        .await
        .unwrap()
        .into_iter()
        .find(|m| m.data.contains("<i>Inbox</i>"))
        .expect("message for the new comment");
    s.mark_message_read(&msg.id).await.unwrap();
    s.delete_post(&post.id).await.unwrap();
}

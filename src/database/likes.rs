use deadpool_postgres::Transaction;

use crate::database::conn::DbError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LikeState {
    pub total_likes: i64,
    pub liked: bool,
}

impl LikeState {
    /// State after a toggle: nothing removed means the like was just added.
    pub fn after_toggle(removed: u64, total_likes: i64) -> Self {
        Self {
            total_likes,
            liked: removed == 0,
        }
    }
}

/// Flips the (user, post) like relation and reports the new state.
///
/// The primary key keeps at most one relation per pair; a concurrent insert
/// of the same pair is absorbed by `ON CONFLICT DO NOTHING`.
pub async fn toggle_like(
    user_id: i64,
    post_id: i64,
    tx: &mut Transaction<'_>,
) -> Result<LikeState, DbError> {
    let removed = tx
        .execute(
            "DELETE FROM post_likes WHERE user_id = $1 AND post_id = $2",
            &[&user_id, &post_id],
        )
        .await?;

    if removed == 0 {
        tx.execute(
            "
            INSERT INTO post_likes (user_id, post_id)
            VALUES ($1, $2)
            ON CONFLICT (user_id, post_id) DO NOTHING
            ",
            &[&user_id, &post_id],
        )
        .await?;
    }

    let total_likes: i64 = tx
        .query_one(
            "SELECT COUNT(*) AS n FROM post_likes WHERE post_id = $1",
            &[&post_id],
        )
        .await?
        .get("n");

    Ok(LikeState::after_toggle(removed, total_likes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    use crate::{
        database::{
            categories::{CategoryData, create_category},
            posts::{PostData, create_post},
            schema::migrate,
            users::{NewUser, create_user},
        },
        utils::{snowflake::generate_id, state::PostgresConfig},
    };

    #[test]
    fn removal_means_unliked() {
        assert_eq!(
            LikeState::after_toggle(0, 1),
            LikeState {
                total_likes: 1,
                liked: true
            }
        );
        assert_eq!(
            LikeState::after_toggle(1, 0),
            LikeState {
                total_likes: 0,
                liked: false
            }
        );
    }

    #[tokio::test]
    #[ignore = "needs POSTGRES_* pointing at a scratch database"]
    async fn toggles_on_then_off() {
        dotenvy::dotenv().ok();
        let pool = PostgresConfig::from_env().unwrap().create_pool().unwrap();
        migrate(&pool).await.unwrap();

        let mut client = pool.get().await.unwrap();
        let mut tx = client.transaction().await.unwrap();
        let suffix = generate_id();
        let user_id = create_user(
            NewUser {
                username: &format!("liker{}", suffix),
                email: "",
                password_hash: "x",
            },
            &mut tx,
        )
        .await
        .unwrap();
        let category_id = create_category(
            &CategoryData {
                title: "Likes".to_string(),
                description: "d".to_string(),
                slug: format!("likes-{}", suffix),
                is_published: true,
            },
            &mut tx,
        )
        .await
        .unwrap();
        let post_id = create_post(
            user_id,
            &PostData {
                title: "Liked".to_string(),
                text: "t".to_string(),
                image: None,
                pub_date: Utc::now(),
                location_id: None,
                category_id: Some(category_id),
                is_published: true,
            },
            &mut tx,
        )
        .await
        .unwrap();

        let first = toggle_like(user_id, post_id, &mut tx).await.unwrap();
        assert_eq!(first, LikeState::after_toggle(0, 1));
        let second = toggle_like(user_id, post_id, &mut tx).await.unwrap();
        assert_eq!(second, LikeState::after_toggle(1, 0));
        let third = toggle_like(user_id, post_id, &mut tx).await.unwrap();
        assert_eq!(third, LikeState::after_toggle(0, 1));

        tx.rollback().await.unwrap();
    }
}

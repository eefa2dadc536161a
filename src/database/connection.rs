use anyhow::Context;
use mongodb::bson::doc;
use mongodb::options::IndexOptions;
use mongodb::{Client, Database, IndexModel};

use crate::config::AppConfig;
use crate::models::{booking::Booking, trip::Trip, user::User};

pub async fn connect(config: &AppConfig) -> anyhow::Result<Database> {
    let client = Client::with_uri_str(&config.database_url)
        .await
        .context("Failed to connect to MongoDB")?;

    let db = client.database(&config.database_name);

    db.run_command(doc! { "ping": 1 })
        .await
        .context("MongoDB ping failed")?;

    ensure_indexes(&db).await?;

    tracing::info!("Connected to database: {}", config.database_name);

    Ok(db)
}

// Unique indexes are the write-path guarantees: one booking per idempotency
// key, one account per email, one trip per slug. Creating them is a no-op
// when they already exist.
async fn ensure_indexes(db: &Database) -> anyhow::Result<()> {
    let unique = IndexOptions::builder().unique(true).build();

    db.collection::<Booking>("bookings")
        .create_index(
            IndexModel::builder()
                .keys(doc! { "idempotency_key": 1 })
                .options(unique.clone())
                .build(),
        )
        .await
        .context("Failed to create bookings.idempotency_key index")?;

    db.collection::<User>("users")
        .create_index(
            IndexModel::builder()
                .keys(doc! { "email": 1 })
                .options(unique.clone())
                .build(),
        )
        .await
        .context("Failed to create users.email index")?;

    db.collection::<Trip>("trips")
        .create_index(
            IndexModel::builder()
                .keys(doc! { "slug": 1 })
                .options(unique)
                .build(),
        )
        .await
        .context("Failed to create trips.slug index")?;

    Ok(())
}

// One-shot backfill: user documents created before roles existed have no
// role field. The API treats role as required, so stamp the default onto
// every document still missing it.
use anyhow::Context;
use mongodb::bson::{doc, Document};
use mongodb::Client;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let uri = std::env::var("MONGODB_URI").context("MONGODB_URI must be set")?;
    let db_name = std::env::var("MONGODB_DB").unwrap_or_else(|_| "achyuta".to_string());

    println!("Backfilling user roles in {}...", db_name);

    let client = Client::with_uri_str(&uri).await?;
    let users = client.database(&db_name).collection::<Document>("users");

    let filter = doc! { "role": { "$exists": false } };
    let missing = users.count_documents(filter.clone()).await?;
    println!("Found {} users without a role", missing);

    if missing == 0 {
        println!("Nothing to do");
        return Ok(());
    }

    let result = users
        .update_many(filter, doc! { "$set": { "role": "user" } })
        .await?;

    println!("Backfill complete! Updated {} users", result.modified_count);
    Ok(())
}

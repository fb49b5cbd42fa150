use crate::commands::utils::clean_name;
use crate::db::Client;
use crate::error::CounselResult;
use sqlx::{Postgres, Transaction};

/// Returns the client registered under `contact`, creating it with `name`
/// when the contact is new.
pub async fn find_or_create_client(
    tx: &mut Transaction<'_, Postgres>,
    name: &str,
    contact: &str,
) -> CounselResult<Client> {
    let name = clean_name(name, "내담자 이름")?;
    let contact = clean_name(contact, "연락처")?;

    let existing = sqlx::query_as::<_, Client>(
        "SELECT id, name, contact FROM clients WHERE contact = $1",
    )
    .bind(&contact)
    .fetch_optional(&mut **tx)
    .await?;
    if let Some(client) = existing {
        return Ok(client);
    }

    // Concurrent submissions for the same contact collapse onto one row.
    let client = sqlx::query_as::<_, Client>(
        "INSERT INTO clients (name, contact) VALUES ($1, $2)
         ON CONFLICT (contact) DO UPDATE SET contact = EXCLUDED.contact
         RETURNING id, name, contact",
    )
    .bind(&name)
    .bind(&contact)
    .fetch_one(&mut **tx)
    .await?;
    tracing::debug!("Client {} created for contact {}", client.id, client.contact);
    Ok(client)
}

/// Applies the name and contact typed into the edit form to an existing client.
pub async fn update_client(
    tx: &mut Transaction<'_, Postgres>,
    id: i32,
    name: &str,
    contact: &str,
) -> CounselResult<Client> {
    let name = clean_name(name, "내담자 이름")?;
    let contact = clean_name(contact, "연락처")?;
    Ok(sqlx::query_as::<_, Client>(
        "UPDATE clients SET name = $1, contact = $2 WHERE id = $3
         RETURNING id, name, contact",
    )
    .bind(name)
    .bind(contact)
    .bind(id)
    .fetch_one(&mut **tx)
    .await?)
}

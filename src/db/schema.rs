//! SQL DDL for the PACS study store.
//! Table and schema names come from configuration, so every statement is
//! rendered from validated identifiers instead of being a fixed string.

use crate::error::SetupError;

/// PostgreSQL truncates identifiers longer than this.
const MAX_IDENTIFIER_LEN: usize = 63;

/// Single-column indexes created alongside the table: (index name, column).
pub const INDEXES: [(&str, &str); 5] = [
    ("idx_study_instance_uid", "study_instance_uid"),
    ("idx_patient_id", "patient_id"),
    ("idx_patient_name", "patient_name"),
    ("idx_study_date", "study_date"),
    ("idx_modality", "modality"),
];

pub const CREATE_EXTENSION: &str = "CREATE EXTENSION IF NOT EXISTS citext";

/// Lowercase ASCII letters, digits and underscores, not starting with a digit.
pub fn is_safe_identifier(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= MAX_IDENTIFIER_LEN
        && !name.starts_with(|c: char| c.is_ascii_digit())
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

/// Double-quote a validated identifier.
pub fn quote_ident(name: &str) -> Result<String, SetupError> {
    if !is_safe_identifier(name) {
        return Err(SetupError::InvalidIdentifier(name.to_string()));
    }
    Ok(format!("\"{name}\""))
}

/// Schema-qualified, quoted table name.
pub fn qualified_table(schema: &str, table: &str) -> Result<String, SetupError> {
    Ok(format!("{}.{}", quote_ident(schema)?, quote_ident(table)?))
}

pub fn create_database(database: &str, owner: &str) -> Result<String, SetupError> {
    Ok(format!(
        "CREATE DATABASE {} WITH OWNER = {} ENCODING = 'UTF8'",
        quote_ident(database)?,
        quote_ident(owner)?
    ))
}

pub fn create_schema(schema: &str) -> Result<String, SetupError> {
    Ok(format!("CREATE SCHEMA IF NOT EXISTS {}", quote_ident(schema)?))
}

/// `study_instance_uid` is the business key; its UNIQUE constraint backs
/// `ON CONFLICT` on the seed insert.
pub fn create_table(schema: &str, table: &str) -> Result<String, SetupError> {
    Ok(format!(
        r#"
CREATE TABLE IF NOT EXISTS {} (
    id SERIAL PRIMARY KEY,
    study_instance_uid VARCHAR(64) UNIQUE,
    patient_id VARCHAR(32),
    patient_name VARCHAR(128),
    patient_birth_date VARCHAR(32),
    patient_age VARCHAR(8),
    patient_sex VARCHAR(2),
    study_date VARCHAR(32),
    study_time VARCHAR(32),
    accession_number VARCHAR(64),
    study_description VARCHAR(128),
    referring_physician_name VARCHAR(128),
    performing_physician_name VARCHAR(128),
    institution_name VARCHAR(128),
    station_name VARCHAR(128),
    modality VARCHAR(2),
    number_of_study_related_series SMALLINT,
    number_of_study_related_instances SMALLINT,
    device_serial_number VARCHAR(128),
    manufacturer VARCHAR(128),
    manufacturer_model_name VARCHAR(128),
    source_ae_title VARCHAR(128),
    dir_path VARCHAR(256),
    started_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
    finished_at TIMESTAMP,
    modified_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
    study_status SMALLINT DEFAULT 1
)"#,
        qualified_table(schema, table)?
    ))
}

pub fn create_index(
    schema: &str,
    table: &str,
    index: &str,
    column: &str,
) -> Result<String, SetupError> {
    Ok(format!(
        "CREATE INDEX IF NOT EXISTS {} ON {} ({})",
        quote_ident(index)?,
        qualified_table(schema, table)?,
        quote_ident(column)?
    ))
}

use crate::db::models::PacsStudy;
use crate::db::schema;
use crate::error::SetupError;
use sqlx::Connection;
use sqlx::postgres::{PgConnectOptions, PgConnection};

/// Open one unpooled connection, so a refusal surfaces as `sqlx::Error::Io`
/// rather than a pool's `PoolTimedOut`.
pub async fn connect(opts: &PgConnectOptions) -> Result<PgConnection, sqlx::Error> {
    PgConnection::connect_with(opts).await
}

/// Table-level operations on `<schema>.<table>` over a single connection.
pub struct PacsStorage {
    conn: PgConnection,
    schema: String,
    table: String,
}

impl PacsStorage {
    pub fn new(conn: PgConnection, schema: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            conn,
            schema: schema.into(),
            table: table.into(),
        }
    }

    pub async fn close(self) -> Result<(), SetupError> {
        self.conn.close().await?;
        Ok(())
    }

    fn table(&self) -> Result<String, SetupError> {
        schema::qualified_table(&self.schema, &self.table)
    }

    pub async fn create_extension(&mut self) -> Result<(), SetupError> {
        sqlx::query(schema::CREATE_EXTENSION)
            .execute(&mut self.conn)
            .await?;
        Ok(())
    }

    pub async fn create_schema(&mut self) -> Result<(), SetupError> {
        sqlx::query(&schema::create_schema(&self.schema)?)
            .execute(&mut self.conn)
            .await?;
        Ok(())
    }

    pub async fn create_table(&mut self) -> Result<(), SetupError> {
        sqlx::query(&schema::create_table(&self.schema, &self.table)?)
            .execute(&mut self.conn)
            .await?;
        Ok(())
    }

    pub async fn create_index(&mut self, index: &str, column: &str) -> Result<(), SetupError> {
        let ddl = schema::create_index(&self.schema, &self.table, index, column)?;
        sqlx::query(&ddl).execute(&mut self.conn).await?;
        Ok(())
    }

    pub async fn count(&mut self) -> Result<i64, SetupError> {
        let sql = format!("SELECT COUNT(*) FROM {}", self.table()?);
        let count: i64 = sqlx::query_scalar(&sql).fetch_one(&mut self.conn).await?;
        Ok(count)
    }

    /// Insert unless the business key already exists. Returns whether a row
    /// was written.
    pub async fn insert_if_absent(&mut self, study: &PacsStudy) -> Result<bool, SetupError> {
        let sql = format!(
            r#"
            INSERT INTO {} (
                study_instance_uid, patient_id, patient_name, patient_birth_date,
                patient_age, patient_sex, study_date, study_time, accession_number,
                study_description, referring_physician_name, performing_physician_name,
                institution_name, station_name, modality,
                number_of_study_related_series, number_of_study_related_instances,
                device_serial_number, manufacturer, manufacturer_model_name,
                source_ae_title, dir_path, study_status
            ) VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12,
                $13, $14, $15, $16, $17, $18, $19, $20, $21, $22, $23
            )
            ON CONFLICT (study_instance_uid) DO NOTHING
            "#,
            self.table()?
        );
        let result = sqlx::query(&sql)
            .bind(&study.study_instance_uid)
            .bind(&study.patient_id)
            .bind(&study.patient_name)
            .bind(&study.patient_birth_date)
            .bind(&study.patient_age)
            .bind(&study.patient_sex)
            .bind(&study.study_date)
            .bind(&study.study_time)
            .bind(&study.accession_number)
            .bind(&study.study_description)
            .bind(&study.referring_physician_name)
            .bind(&study.performing_physician_name)
            .bind(&study.institution_name)
            .bind(&study.station_name)
            .bind(&study.modality)
            .bind(study.number_of_study_related_series)
            .bind(study.number_of_study_related_instances)
            .bind(&study.device_serial_number)
            .bind(&study.manufacturer)
            .bind(&study.manufacturer_model_name)
            .bind(&study.source_ae_title)
            .bind(&study.dir_path)
            .bind(study.study_status)
            .execute(&mut self.conn)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Names of the `idx_*` indexes present on the table, sorted.
    pub async fn index_names(&mut self) -> Result<Vec<String>, SetupError> {
        let names = sqlx::query_scalar(
            r#"SELECT indexname::text FROM pg_indexes
               WHERE schemaname = $1 AND tablename = $2 AND indexname LIKE 'idx\_%'
               ORDER BY indexname"#,
        )
        .bind(&self.schema)
        .bind(&self.table)
        .fetch_all(&mut self.conn)
        .await?;
        Ok(names)
    }
}

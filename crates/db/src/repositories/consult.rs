use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, QueryBuilder, Row, Sqlite};

use buycar_core::domain::consult::{
    Consult, ConsultId, ConsultPreferences, ConsultStatus, GenerationFields,
};

use super::{ConsultRepository, RepositoryError};
use crate::DbPool;

pub struct SqlConsultRepository {
    pool: DbPool,
}

impl SqlConsultRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl ConsultRepository for SqlConsultRepository {
    async fn create(&self, consult: &Consult) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO consult (
                id,
                user_id,
                budget_range,
                preferred_type,
                use_case,
                fuel_type,
                brand_preference,
                llm_model,
                llm_prompt,
                llm_response,
                recommendations,
                status,
                created_at,
                updated_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&consult.id.0)
        .bind(consult.user_id)
        .bind(consult.preferences.budget_range.as_deref())
        .bind(consult.preferences.preferred_type.as_deref())
        .bind(consult.preferences.use_case.as_deref())
        .bind(consult.preferences.fuel_type.as_deref())
        .bind(consult.preferences.brand_preference.as_deref())
        .bind(consult.generation.llm_model.as_deref())
        .bind(consult.generation.llm_prompt.as_deref())
        .bind(consult.generation.llm_response.as_deref())
        .bind(consult.generation.recommendations.as_deref())
        .bind(consult.status.as_str())
        .bind(consult.created_at.to_rfc3339())
        .bind(consult.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|error| {
            if matches!(&error, sqlx::Error::Database(db) if db.is_unique_violation()) {
                RepositoryError::Duplicate(consult.id.0.clone())
            } else {
                RepositoryError::Database(error)
            }
        })?;

        Ok(())
    }

    async fn find_by_id(&self, id: &ConsultId) -> Result<Option<Consult>, RepositoryError> {
        let row = sqlx::query(
            "SELECT
                id,
                user_id,
                budget_range,
                preferred_type,
                use_case,
                fuel_type,
                brand_preference,
                llm_model,
                llm_prompt,
                llm_response,
                recommendations,
                status,
                created_at,
                updated_at
             FROM consult
             WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.map(consult_from_row).transpose()
    }

    async fn update_status(
        &self,
        id: &ConsultId,
        expected: ConsultStatus,
        next: ConsultStatus,
    ) -> Result<bool, RepositoryError> {
        if !expected.can_transition_to(next) {
            return Ok(false);
        }

        let result = sqlx::query(
            "UPDATE consult
             SET status = ?, updated_at = ?
             WHERE id = ? AND status = ?",
        )
        .bind(next.as_str())
        .bind(Utc::now().to_rfc3339())
        .bind(&id.0)
        .bind(expected.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn update_generation_fields(
        &self,
        id: &ConsultId,
        fields: &GenerationFields,
    ) -> Result<(), RepositoryError> {
        if fields.is_empty() {
            return Ok(());
        }

        let columns = [
            ("llm_model", &fields.llm_model),
            ("llm_prompt", &fields.llm_prompt),
            ("llm_response", &fields.llm_response),
            ("recommendations", &fields.recommendations),
        ];

        let mut builder = QueryBuilder::<Sqlite>::new("UPDATE consult SET ");
        let mut assignments = builder.separated(", ");
        for (column, value) in columns {
            if let Some(value) = value {
                assignments.push(column);
                assignments.push_unseparated(" = ");
                assignments.push_bind_unseparated(value.clone());
            }
        }
        assignments.push("updated_at = ");
        assignments.push_bind_unseparated(Utc::now().to_rfc3339());
        builder.push(" WHERE id = ");
        builder.push_bind(id.0.clone());

        builder.build().execute(&self.pool).await?;
        Ok(())
    }
}

fn consult_from_row(row: SqliteRow) -> Result<Consult, RepositoryError> {
    let status_raw = row.try_get::<String, _>("status")?;
    let status = ConsultStatus::parse(&status_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown consult status `{status_raw}`")))?;

    Ok(Consult {
        id: ConsultId(row.try_get("id")?),
        user_id: row.try_get("user_id")?,
        preferences: ConsultPreferences {
            budget_range: row.try_get("budget_range")?,
            preferred_type: row.try_get("preferred_type")?,
            use_case: row.try_get("use_case")?,
            fuel_type: row.try_get("fuel_type")?,
            brand_preference: row.try_get("brand_preference")?,
        },
        generation: GenerationFields {
            llm_model: row.try_get("llm_model")?,
            llm_prompt: row.try_get("llm_prompt")?,
            llm_response: row.try_get("llm_response")?,
            recommendations: row.try_get("recommendations")?,
        },
        status,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
        updated_at: parse_timestamp("updated_at", row.try_get("updated_at")?)?,
    })
}

fn parse_timestamp(column: &str, value: String) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(&value).map(|timestamp| timestamp.with_timezone(&Utc)).map_err(
        |error| {
            RepositoryError::Decode(format!("invalid timestamp in `{column}`: `{value}` ({error})"))
        },
    )
}

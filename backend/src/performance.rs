use std::collections::HashSet;

use chrono::NaiveDateTime;
use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;
use diesel::upsert::excluded;
use serde::Serialize;

use crate::error::{ServiceError, ServiceResult};
use crate::models::{Desempenho, NewDesempenho};
use crate::schema::{missoes, municipio_desempenhos, municipios};
use crate::status::ValidationStatus;
use crate::utils::json::JsonList;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Score {
    pub points: i32,
    pub badges: i32,
}

impl Score {
    /// Points are the reward sum of every VALID record; badges count distinct missions.
    pub fn from_valid_records(records: &[(String, i32)]) -> Self {
        let points = records.iter().map(|(_, pontos)| *pontos).sum();
        let badges = records
            .iter()
            .map(|(missao_id, _)| missao_id.as_str())
            .collect::<HashSet<_>>()
            .len() as i32;
        Self { points, badges }
    }
}

#[derive(Debug, Clone)]
pub struct UpsertOutcome {
    pub desempenho: Desempenho,
    pub created: bool,
    pub score: Score,
}

/// Recomputes and stores `points`/`badges` for one municipality.
pub fn recompute_score(conn: &mut SqliteConnection, cod_ibge: &str) -> ServiceResult<Score> {
    let valid: Vec<(String, i32)> = municipio_desempenhos::table
        .inner_join(missoes::table)
        .filter(municipio_desempenhos::cod_ibge.eq(cod_ibge))
        .filter(municipio_desempenhos::validation_status.eq(ValidationStatus::Valid.as_str()))
        .select((missoes::id, missoes::qnt_pontos))
        .load(conn)?;

    let score = Score::from_valid_records(&valid);

    let updated = diesel::update(municipios::table.find(cod_ibge))
        .set((
            municipios::points.eq(score.points),
            municipios::badges.eq(score.badges),
        ))
        .execute(conn)?;
    if updated == 0 {
        return Err(ServiceError::not_found(format!(
            "Município {cod_ibge} não encontrado"
        )));
    }

    Ok(score)
}

/// Full pass over every municipality.
pub fn recompute_all_scores(conn: &mut SqliteConnection) -> ServiceResult<usize> {
    let codes: Vec<String> = municipios::table
        .select(municipios::cod_ibge)
        .load(conn)?;
    for code in &codes {
        recompute_score(conn, code)?;
    }
    Ok(codes.len())
}

/// Creates or replaces the record for `(cod_ibge, missao_id)` and refreshes the
/// owner's score in the same transaction.
pub fn upsert_desempenho(
    conn: &mut SqliteConnection,
    cod_ibge: &str,
    missao_id: &str,
    status: ValidationStatus,
    evidence: JsonList,
    updated_at: NaiveDateTime,
) -> ServiceResult<UpsertOutcome> {
    conn.transaction::<_, ServiceError, _>(|conn| {
        let existing = municipio_desempenhos::table
            .filter(municipio_desempenhos::cod_ibge.eq(cod_ibge))
            .filter(municipio_desempenhos::missao_id.eq(missao_id))
            .select(municipio_desempenhos::id)
            .first::<i32>(conn)
            .optional()?;

        let row = NewDesempenho {
            cod_ibge: cod_ibge.to_string(),
            missao_id: missao_id.to_string(),
            validation_status: status,
            updated_at,
            evidence,
        };

        let desempenho: Desempenho = diesel::insert_into(municipio_desempenhos::table)
            .values(row)
            .on_conflict((
                municipio_desempenhos::cod_ibge,
                municipio_desempenhos::missao_id,
            ))
            .do_update()
            .set((
                municipio_desempenhos::validation_status
                    .eq(excluded(municipio_desempenhos::validation_status)),
                municipio_desempenhos::updated_at.eq(excluded(municipio_desempenhos::updated_at)),
                municipio_desempenhos::evidence.eq(excluded(municipio_desempenhos::evidence)),
            ))
            .get_result(conn)?;

        let score = recompute_score(conn, cod_ibge)?;

        Ok(UpsertOutcome {
            desempenho,
            created: existing.is_none(),
            score,
        })
    })
}

/// Inserts a new record. A second record for the same pair is a conflict.
pub fn insert_desempenho(
    conn: &mut SqliteConnection,
    row: NewDesempenho,
) -> ServiceResult<(Desempenho, Score)> {
    conn.transaction::<_, ServiceError, _>(|conn| {
        let cod_ibge = row.cod_ibge.clone();
        let desempenho: Desempenho = diesel::insert_into(municipio_desempenhos::table)
            .values(row)
            .get_result(conn)?;
        let score = recompute_score(conn, &cod_ibge)?;
        Ok((desempenho, score))
    })
}

/// Fields of a record that may change after creation. `None` keeps the
/// stored value.
#[derive(Debug, Clone, Default)]
pub struct DesempenhoChanges {
    pub cod_ibge: Option<String>,
    pub missao_id: Option<String>,
    pub validation_status: Option<ValidationStatus>,
    pub evidence: Option<JsonList>,
}

#[derive(AsChangeset)]
#[diesel(table_name = municipio_desempenhos)]
struct DesempenhoChangeset {
    cod_ibge: Option<String>,
    missao_id: Option<String>,
    validation_status: Option<String>,
    updated_at: NaiveDateTime,
    evidence: Option<String>,
}

/// Applies `changes`, stamps `updated_at` and refreshes the score of every
/// municipality the record belonged to before or after the change.
pub fn update_desempenho(
    conn: &mut SqliteConnection,
    id: i32,
    changes: DesempenhoChanges,
    updated_at: NaiveDateTime,
) -> ServiceResult<Desempenho> {
    conn.transaction::<_, ServiceError, _>(|conn| {
        let previous: Desempenho = municipio_desempenhos::table
            .find(id)
            .first(conn)
            .optional()?
            .ok_or_else(|| ServiceError::not_found(format!("Desempenho {id} não encontrado")))?;

        let changeset = DesempenhoChangeset {
            cod_ibge: changes.cod_ibge,
            missao_id: changes.missao_id,
            validation_status: changes.validation_status.map(String::from),
            updated_at,
            evidence: changes.evidence.map(String::from),
        };

        let desempenho: Desempenho = diesel::update(municipio_desempenhos::table.find(id))
            .set(changeset)
            .get_result(conn)?;

        recompute_score(conn, &desempenho.cod_ibge)?;
        if previous.cod_ibge != desempenho.cod_ibge {
            recompute_score(conn, &previous.cod_ibge)?;
        }
        Ok(desempenho)
    })
}

pub fn delete_desempenho(conn: &mut SqliteConnection, id: i32) -> ServiceResult<Score> {
    conn.transaction::<_, ServiceError, _>(|conn| {
        let cod_ibge: String = municipio_desempenhos::table
            .find(id)
            .select(municipio_desempenhos::cod_ibge)
            .first(conn)
            .optional()?
            .ok_or_else(|| ServiceError::not_found(format!("Desempenho {id} não encontrado")))?;

        diesel::delete(municipio_desempenhos::table.find(id)).execute(conn)?;
        recompute_score(conn, &cod_ibge)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn score_sums_points_and_counts_distinct_missions() {
        let records = vec![
            ("m1".to_string(), 60),
            ("m2".to_string(), 50),
        ];
        assert_eq!(
            Score::from_valid_records(&records),
            Score {
                points: 110,
                badges: 2
            }
        );
    }

    #[test]
    fn duplicate_mission_counts_one_badge() {
        let records = vec![("m1".to_string(), 30), ("m1".to_string(), 30)];
        let score = Score::from_valid_records(&records);
        assert_eq!(score.badges, 1);
        assert_eq!(score.points, 60);
    }

    #[test]
    fn empty_score() {
        assert_eq!(
            Score::from_valid_records(&[]),
            Score {
                points: 0,
                badges: 0
            }
        );
    }
}

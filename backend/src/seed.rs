//! Fixed list of participating organizations (órgãos).

use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;
use serde_json::json;

use crate::models::NewMunicipio;
use crate::schema::municipios;
use crate::status::STATUS_PARTICIPANTE;
use crate::utils::json::JsonBlob;

/// Organizations whose performance records are maintained from seeded data
/// and never overwritten by the upstream sync.
pub const DEFAULT_SEEDED_ORG_CODES: &[&str] = &["mpce"];

pub struct SeedOrganization {
    pub code: &'static str,
    pub nome: &'static str,
}

pub const SEEDED_ORGANIZATIONS: &[SeedOrganization] = &[
    SeedOrganization {
        code: "mpce",
        nome: "Ministério Público do Estado do Ceará",
    },
];

/// Inserts the organization rows that are missing. Existing rows are left untouched.
pub fn seed_organizations(conn: &mut SqliteConnection) -> QueryResult<usize> {
    let mut inserted = 0;
    for org in SEEDED_ORGANIZATIONS {
        let row = NewMunicipio {
            cod_ibge: org.code.to_string(),
            nome: org.nome.to_string(),
            status: STATUS_PARTICIPANTE.to_string(),
            data_alteracao: None,
            imagem_avatar: None,
            json: JsonBlob(Some(json!({ "codIbge": org.code, "nome": org.nome, "orgao": true }))),
            orgao: true,
        };
        inserted += diesel::insert_or_ignore_into(municipios::table)
            .values(row)
            .execute(conn)?;
    }
    Ok(inserted)
}

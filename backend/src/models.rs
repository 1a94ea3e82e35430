use chrono::NaiveDateTime;
use diesel::prelude::*;

use crate::schema::*;
use crate::status::ValidationStatus;
use crate::utils::json::{JsonBlob, JsonList};

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = municipios, primary_key(cod_ibge))]
pub struct Municipio {
    pub cod_ibge: String,
    pub nome: String,
    pub status: String,
    pub data_alteracao: Option<NaiveDateTime>,
    pub imagem_avatar: Option<String>,
    pub badges: i32,
    pub points: i32,
    #[diesel(deserialize_as = Option<String>)]
    pub json: JsonBlob,
    pub orgao: bool,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = municipios)]
pub struct NewMunicipio {
    pub cod_ibge: String,
    pub nome: String,
    pub status: String,
    pub data_alteracao: Option<NaiveDateTime>,
    pub imagem_avatar: Option<String>,
    #[diesel(serialize_as = Option<String>)]
    pub json: JsonBlob,
    pub orgao: bool,
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = missoes)]
pub struct Missao {
    pub id: String,
    pub categoria: String,
    pub descricao_da_categoria: String,
    pub emblema_da_categoria: String,
    pub descricao_da_missao: String,
    pub qnt_pontos: i32,
    pub link_formulario: Option<String>,
    #[diesel(deserialize_as = String)]
    pub evidencias: JsonList,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = missoes)]
pub struct NewMissao {
    pub id: String,
    pub categoria: String,
    pub descricao_da_categoria: String,
    pub emblema_da_categoria: String,
    pub descricao_da_missao: String,
    pub qnt_pontos: i32,
    pub link_formulario: Option<String>,
    #[diesel(serialize_as = String)]
    pub evidencias: JsonList,
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = municipio_desempenhos)]
pub struct Desempenho {
    pub id: i32,
    pub cod_ibge: String,
    pub missao_id: String,
    #[diesel(deserialize_as = String)]
    pub validation_status: ValidationStatus,
    pub updated_at: NaiveDateTime,
    #[diesel(deserialize_as = String)]
    pub evidence: JsonList,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = municipio_desempenhos)]
pub struct NewDesempenho {
    pub cod_ibge: String,
    pub missao_id: String,
    #[diesel(serialize_as = String)]
    pub validation_status: ValidationStatus,
    pub updated_at: NaiveDateTime,
    #[diesel(serialize_as = String)]
    pub evidence: JsonList,
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = eventos)]
pub struct Evento {
    pub id: i32,
    pub data_alteracao: NaiveDateTime,
    pub event: String,
    pub description: Option<String>,
    pub cod_ibge: Option<String>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = eventos)]
pub struct NewEvento {
    pub data_alteracao: NaiveDateTime,
    pub event: String,
    pub description: Option<String>,
    pub cod_ibge: Option<String>,
}

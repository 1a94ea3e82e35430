mod common;

use anyhow::Result;
use axum::http::StatusCode;
use common::{body_to_vec, response_data, TestApp};
use serde_json::{json, Value};

#[tokio::test]
async fn health_reports_database() -> Result<()> {
    let app = TestApp::new().await?;
    let response = app.get("/api/health").await?;
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = serde_json::from_slice(&body_to_vec(response.into_body()).await?)?;
    assert_eq!(body, json!({"status": "ok", "database": "ok"}));
    Ok(())
}

#[tokio::test]
async fn municipio_create_and_lookup() -> Result<()> {
    let app = TestApp::new().await?;

    let created = app
        .post_json(
            "/api/municipios",
            &json!({
                "codIbge": "2300101",
                "nome": "Abaiara",
                "status": "Participante",
                "dataAlteracao": "2024-01-10T10:00:00.000Z",
                "imagemAvatar": "https://img.example/abaiara.png"
            }),
        )
        .await?;
    assert_eq!(created.status(), StatusCode::CREATED);
    let municipio = response_data(created).await?;
    assert_eq!(municipio["codIbge"], "2300101");
    assert_eq!(municipio["points"], 0);
    assert_eq!(municipio["level"], 0);
    assert_eq!(municipio["dataAlteracao"], "2024-01-10T10:00:00");

    let duplicate = app
        .post_json(
            "/api/municipios",
            &json!({"codIbge": "2300101", "nome": "Abaiara"}),
        )
        .await?;
    assert_eq!(duplicate.status(), StatusCode::BAD_REQUEST);

    let bad_status = app
        .post_json(
            "/api/municipios",
            &json!({"codIbge": "2300200", "nome": "Acarape", "status": "Talvez"}),
        )
        .await?;
    assert_eq!(bad_status.status(), StatusCode::BAD_REQUEST);

    let fetched = response_data(app.get("/api/municipios/2300101").await?).await?;
    assert_eq!(fetched["nome"], "Abaiara");

    let orgaos = response_data(app.get("/api/municipios?orgao=true").await?).await?;
    assert_eq!(orgaos.as_array().map(Vec::len), Some(1));
    assert!(orgaos
        .as_array()
        .into_iter()
        .flatten()
        .all(|m| m["orgao"] == json!(true)));

    let all = response_data(app.get("/api/municipios").await?).await?;
    assert_eq!(all.as_array().map(Vec::len), Some(2));

    let missing = app.get("/api/municipios/0000000").await?;
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);

    Ok(())
}

#[tokio::test]
async fn evento_crud_flow() -> Result<()> {
    let app = TestApp::new().await?;
    app.insert_municipio("2300101", "Abaiara", "Participante")
        .await?;

    let created = app
        .post_json(
            "/api/eventos",
            &json!({
                "data_alteracao": "2024-03-01 10:00:00",
                "event": "mission_completed",
                "description": "CMP-01",
                "codIbge": "2300101"
            }),
        )
        .await?;
    assert_eq!(created.status(), StatusCode::CREATED);
    let evento = response_data(created).await?;
    let id = evento["id"].as_i64().unwrap_or_default();
    assert_eq!(evento["codIbge"], "2300101");

    let unknown_owner = app
        .post_json(
            "/api/eventos",
            &json!({"event": "mission_completed", "codIbge": "0000000"}),
        )
        .await?;
    assert_eq!(unknown_owner.status(), StatusCode::NOT_FOUND);

    let newer = app
        .post_json(
            "/api/eventos",
            &json!({"event": "status_changed", "data_alteracao": "2024-03-05 08:00:00"}),
        )
        .await?;
    assert_eq!(newer.status(), StatusCode::CREATED);

    let listed = response_data(app.get("/api/eventos").await?).await?;
    assert_eq!(listed[0]["event"], "status_changed");
    assert_eq!(listed.as_array().map(Vec::len), Some(2));

    let by_owner = response_data(app.get("/api/eventos/municipio/2300101").await?).await?;
    assert_eq!(by_owner.as_array().map(Vec::len), Some(1));

    let updated = app
        .put_json(
            &format!("/api/eventos/{id}"),
            &json!({"description": null, "codIbge": null}),
        )
        .await?;
    assert_eq!(updated.status(), StatusCode::OK);
    let evento = response_data(updated).await?;
    assert_eq!(evento["description"], Value::Null);
    assert_eq!(evento["codIbge"], Value::Null);
    assert_eq!(evento["event"], "mission_completed");

    let deleted = app.delete(&format!("/api/eventos/{id}")).await?;
    assert_eq!(deleted.status(), StatusCode::OK);
    let gone = app.get(&format!("/api/eventos/{id}")).await?;
    assert_eq!(gone.status(), StatusCode::NOT_FOUND);
    assert_eq!(app.count_eventos().await?, 1);

    Ok(())
}

#[tokio::test]
async fn evento_list_returns_everything_unless_limited() -> Result<()> {
    let app = TestApp::new().await?;
    app.insert_eventos(520).await?;

    let all = response_data(app.get("/api/eventos").await?).await?;
    let all = all.as_array().cloned().unwrap_or_default();
    assert_eq!(all.len(), 520);
    assert_eq!(all[0]["event"], "evento-519");
    assert_eq!(all[519]["event"], "evento-0");

    let limited = response_data(app.get("/api/eventos?limit=3").await?).await?;
    let events: Vec<Value> = limited
        .as_array()
        .into_iter()
        .flatten()
        .map(|e| e["event"].clone())
        .collect();
    assert_eq!(
        events,
        vec![json!("evento-519"), json!("evento-518"), json!("evento-517")]
    );

    let invalid = app.get("/api/eventos?limit=0").await?;
    assert_eq!(invalid.status(), StatusCode::BAD_REQUEST);

    Ok(())
}

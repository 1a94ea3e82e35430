mod common;

use anyhow::Result;
use axum::http::StatusCode;
use common::{body_to_vec, response_data, TestApp};
use pacto_backend::status::{ValidationStatus, STATUS_PARTICIPANTE};
use serde_json::{json, Value};

#[tokio::test]
async fn missao_crud_flow() -> Result<()> {
    let app = TestApp::new().await?;

    let created = app
        .post_json(
            "/api/missoes",
            &json!({
                "id": "CMP-01",
                "categoria": "Governança",
                "descricao_da_missao": "Instituir comitê intersetorial",
                "qnt_pontos": 60,
                "link_formulario": "https://forms.example/cmp-01",
                "evidencias": "[{\"titulo\":\"Decreto\"}]"
            }),
        )
        .await?;
    assert_eq!(created.status(), StatusCode::CREATED);
    let missao = response_data(created).await?;
    assert_eq!(missao["id"], "CMP-01");
    assert_eq!(missao["evidencias"], json!([{"titulo": "Decreto"}]));
    assert_eq!(missao["descricao_da_categoria"], "");

    let duplicate = app
        .post_json(
            "/api/missoes",
            &json!({
                "id": "CMP-01",
                "categoria": "Governança",
                "descricao_da_missao": "Outra",
                "qnt_pontos": 10
            }),
        )
        .await?;
    assert_eq!(duplicate.status(), StatusCode::BAD_REQUEST);

    let listed = response_data(app.get("/api/missoes").await?).await?;
    assert_eq!(listed.as_array().map(Vec::len), Some(1));

    // explicit null clears the link, omitted fields keep their values
    let updated = app
        .put_json(
            "/api/missoes/CMP-01",
            &json!({"link_formulario": null, "descricao_da_missao": "Comitê instituído"}),
        )
        .await?;
    assert_eq!(updated.status(), StatusCode::OK);
    let missao = response_data(updated).await?;
    assert_eq!(missao["link_formulario"], Value::Null);
    assert_eq!(missao["descricao_da_missao"], "Comitê instituído");
    assert_eq!(missao["qnt_pontos"], 60);

    let invalid = app
        .put_json("/api/missoes/CMP-01", &json!({"link_formulario": 42}))
        .await?;
    assert_eq!(invalid.status(), StatusCode::BAD_REQUEST);

    let missing = app.get("/api/missoes/NOPE").await?;
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    let body: Value = serde_json::from_slice(&body_to_vec(missing.into_body()).await?)?;
    assert_eq!(body["status"], "error");
    assert_eq!(body["message"], "Missão NOPE não encontrada");

    Ok(())
}

#[tokio::test]
async fn reward_change_and_delete_refresh_scores() -> Result<()> {
    let app = TestApp::new().await?;
    app.insert_municipio("2300101", "Abaiara", STATUS_PARTICIPANTE)
        .await?;
    app.insert_missao("CMP-01", 60).await?;
    app.insert_missao("CMP-02", 50).await?;

    for missao in ["CMP-01", "CMP-02"] {
        let response = app
            .post_json(
                "/api/desempenhos",
                &json!({"codIbge": "2300101", "missaoId": missao, "validation_status": "VALID"}),
            )
            .await?;
        assert_eq!(response.status(), StatusCode::CREATED);
    }
    assert_eq!(app.municipio("2300101").await?.points, 110);

    let updated = app
        .put_json("/api/missoes/CMP-01", &json!({"qnt_pontos": 80}))
        .await?;
    assert_eq!(updated.status(), StatusCode::OK);
    assert_eq!(app.municipio("2300101").await?.points, 130);

    let deleted = app.delete("/api/missoes/CMP-02").await?;
    assert_eq!(deleted.status(), StatusCode::OK);

    let municipio = app.municipio("2300101").await?;
    assert_eq!(municipio.points, 80);
    assert_eq!(municipio.badges, 1);
    assert_eq!(app.count_desempenhos().await?, 1);

    let again = app.delete("/api/missoes/CMP-02").await?;
    assert_eq!(again.status(), StatusCode::NOT_FOUND);

    Ok(())
}

#[tokio::test]
async fn negative_reward_is_rejected() -> Result<()> {
    let app = TestApp::new().await?;
    app.insert_missao("CMP-01", 10).await?;
    app.insert_desempenho("mpce", "CMP-01", ValidationStatus::Valid, vec![])
        .await?;

    let response = app
        .put_json("/api/missoes/CMP-01", &json!({"qnt_pontos": -5}))
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let missao = response_data(app.get("/api/missoes/CMP-01").await?).await?;
    assert_eq!(missao["qnt_pontos"], 10);
    Ok(())
}

mod support;

#[derive(Debug, serde::Deserialize)]
struct HealthBody {
    status: String,
    rooms: usize,
    players: usize,
}

#[tokio::test]
async fn health_probe_reports_room_and_player_counts() {
    let base_url = support::ensure_server();
    let client = reqwest::Client::new();

    let res = client
        .get(base_url)
        .send()
        .await
        .expect("request should succeed");
    assert_eq!(res.status(), reqwest::StatusCode::OK);

    let body: HealthBody = res.json().await.expect("health body should decode");
    assert_eq!(body.status, "ok");
    // Other tests share this server; counts only need to be coherent.
    // No mode seats more than six players.
    assert!(body.players <= body.rooms * 6);
}

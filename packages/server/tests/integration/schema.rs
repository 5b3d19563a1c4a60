use sea_orm::{ConnectionTrait, DbBackend, Statement};

use crate::common::TestApp;

async fn index_names(app: &TestApp) -> Vec<String> {
    let rows = app
        .db
        .query_all_raw(Statement::from_string(
            DbBackend::Sqlite,
            "SELECT name FROM sqlite_master WHERE type = 'index'",
        ))
        .await
        .unwrap();
    rows.iter()
        .map(|row| row.try_get::<String>("", "name").unwrap())
        .collect()
}

#[tokio::test]
async fn display_pointer_columns_are_indexed() {
    let app = TestApp::spawn().await;

    let names = index_names(&app).await;

    for expected in [
        "idx_check_in_plant_date",
        "idx_photo_owner_created",
        "idx_photo_target",
        "idx_plant_photo",
        "idx_check_in_photo",
    ] {
        assert!(names.iter().any(|n| n == expected), "missing {expected}: {names:?}");
    }
}

mod common;

use std::sync::Arc;

use common::{TABLE, age_bracket, full_name, people_store, person};
use memovirt::query::JoinOperator;
use memovirt::{
    AttributeAccess, DbError, Record, RecordStore, Repository, SqlDialect, Value, VirtualConfig,
    VirtualModel,
};

fn model(config: VirtualConfig) -> Arc<VirtualModel> {
    VirtualModel::builder(TABLE, config)
        .attribute_with("fullName", full_name)
        .attribute_with("ageBracket", age_bracket)
        .build()
        .unwrap()
}

async fn repository(config: VirtualConfig) -> Repository {
    let store = people_store(SqlDialect::PostgreSql, &["_fullName", "_ageBracket"]).await;
    Repository::open(store, model(config)).await.unwrap()
}

#[tokio::test]
async fn open_requires_every_shadow_column() {
    let store = people_store(SqlDialect::PostgreSql, &["_fullName"]).await;
    let err = Repository::open(store, model(VirtualConfig::shadowed()))
        .await
        .err()
        .unwrap();
    assert!(err.is_configuration());
    assert!(err.to_string().contains("_ageBracket"));
}

#[tokio::test]
async fn create_writes_every_shadow_field() {
    let repo = repository(VirtualConfig::shadowed()).await;
    let mut record = Record::from_attributes(repo.model(), person("Ann", "Lee", 2000));

    let key = repo.create(&mut record).await.unwrap();

    let stored = repo.store().find_by_key(TABLE, key).await.unwrap().unwrap();
    assert_eq!(stored.attributes["_fullName"], Value::from("Ann Lee"));
    assert_eq!(stored.attributes["_ageBracket"], Value::from("adult"));
}

#[tokio::test]
async fn writable_assignment_never_reaches_shadow_field() {
    let repo = repository(VirtualConfig::shadowed().writable(true)).await;
    let mut record = Record::from_attributes(repo.model(), person("Ann", "Lee", 2000));
    record.set("ageBracket", "minor".into()).unwrap();

    let key = repo.save(&mut record).await.unwrap();

    assert_eq!(record.get("ageBracket"), Value::from("minor"));
    let stored = repo.store().find_by_key(TABLE, key).await.unwrap().unwrap();
    assert_eq!(stored.attributes["_ageBracket"], Value::from("adult"));
}

#[tokio::test]
async fn loaded_record_starts_from_shadow_values() {
    let repo = repository(VirtualConfig::shadowed().writable(true)).await;
    let mut record = Record::from_attributes(repo.model(), person("Ann", "Lee", 2000));
    let key = repo.create(&mut record).await.unwrap();

    let mut loaded = repo.find(key).await.unwrap().unwrap();
    assert_eq!(loaded.get("fullName"), Value::from("Ann Lee"));
    assert!(loaded.is_virtual("fullName"));
    assert!(!loaded.is_virtual("_fullName"));
}

#[tokio::test]
async fn read_only_write_rejected() {
    let repo = repository(VirtualConfig::shadowed()).await;
    let mut record = Record::from_attributes(repo.model(), person("Ann", "Lee", 2000));
    assert!(matches!(
        record.set("ageBracket", "minor".into()),
        Err(DbError::ReadOnlyWriteRejected { .. })
    ));
    assert_eq!(record.get("ageBracket"), Value::from("adult"));
}

#[tokio::test]
async fn search_by_name_or_shadow_alias() {
    let repo = repository(VirtualConfig::shadowed()).await;
    for (first, last, year) in [("Ann", "Lee", 2000), ("Bo", "Chan", 2012), ("Cy", "Lee", 1970)] {
        let mut record = Record::from_attributes(repo.model(), person(first, last, year));
        repo.create(&mut record).await.unwrap();
    }

    let mut by_name = repo.search();
    by_name
        .compare("ageBracket", "adult", false, JoinOperator::And)
        .unwrap();
    assert_eq!(repo.find_all(by_name.criteria()).await.unwrap().len(), 2);

    let mut by_alias = repo.search();
    by_alias
        .compare("_fullName", "Lee", true, JoinOperator::And)
        .unwrap()
        .order_by("fullName", true)
        .unwrap();
    let names: Vec<Value> = repo
        .find_all(by_alias.criteria())
        .await
        .unwrap()
        .into_iter()
        .map(|record| record.attributes()["_fullName"].clone())
        .collect();
    assert_eq!(names, vec![Value::from("Cy Lee"), Value::from("Ann Lee")]);
}

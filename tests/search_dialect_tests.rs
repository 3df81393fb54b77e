mod common;

use common::{TABLE, age_bracket, full_name, people_store, person};
use memovirt::query::JoinOperator;
use memovirt::{
    DbError, MemoryStore, Record, Repository, SqlDialect, VirtualConfig, VirtualModel, VirtualSearch,
};

async fn populated(dialect: SqlDialect) -> Repository {
    let store = people_store(dialect, &["virtual_cache"]).await;
    let model = VirtualModel::builder(TABLE, VirtualConfig::packed())
        .attribute_with("fullName", full_name)
        .attribute_with("ageBracket", age_bracket)
        .build()
        .unwrap();
    let repo = Repository::open(store, model).await.unwrap();

    for (first, last, year) in [
        ("Ann", "Lee", 2000),
        ("Bo", "Chan", 2012),
        ("Cy", "Dunn", 1970),
        ("Di", "Lee", 2010),
    ] {
        let mut record = Record::from_attributes(repo.model(), person(first, last, year));
        repo.create(&mut record).await.unwrap();
    }
    repo
}

async fn full_names(repo: &Repository, search: &VirtualSearch) -> Vec<String> {
    repo.find_all(search.criteria())
        .await
        .unwrap()
        .into_iter()
        .map(|record| full_name(record.attributes()).as_str().unwrap_or_default().to_string())
        .collect()
}

const DIALECTS: [SqlDialect; 3] = [SqlDialect::MySql, SqlDialect::PostgreSql, SqlDialect::Sqlite];

#[tokio::test]
async fn exact_match_in_every_dialect() {
    for dialect in DIALECTS {
        let repo = populated(dialect.clone()).await;
        let mut search = repo.search();
        search
            .compare("ageBracket", "minor", false, JoinOperator::And)
            .unwrap();
        assert_eq!(full_names(&repo, &search).await, vec!["Bo Chan", "Di Lee"], "{}", dialect);
    }
}

#[tokio::test]
async fn partial_match_in_every_dialect() {
    for dialect in DIALECTS {
        let repo = populated(dialect.clone()).await;
        let mut search = repo.search();
        search.compare("fullName", "Lee", true, JoinOperator::And).unwrap();
        assert_eq!(full_names(&repo, &search).await, vec!["Ann Lee", "Di Lee"], "{}", dialect);

        let mut negated = repo.search();
        negated.compare("fullName", "<>Lee", true, JoinOperator::And).unwrap();
        assert_eq!(full_names(&repo, &negated).await, vec!["Bo Chan", "Cy Dunn"], "{}", dialect);
    }
}

#[tokio::test]
async fn operator_prefix_and_or_join() {
    for dialect in DIALECTS {
        let repo = populated(dialect.clone()).await;
        let mut search = repo.search();
        search
            .compare("fullName", ">= Cy", false, JoinOperator::And)
            .unwrap()
            .compare("fullName", "Ann Lee", false, JoinOperator::Or)
            .unwrap();
        assert_eq!(
            full_names(&repo, &search).await,
            vec!["Ann Lee", "Cy Dunn", "Di Lee"],
            "{}",
            dialect
        );
    }
}

#[tokio::test]
async fn order_by_virtual_attribute() {
    for dialect in DIALECTS {
        let repo = populated(dialect.clone()).await;
        let mut search = repo.search();
        search.order_by("fullName", true).unwrap();
        assert_eq!(
            full_names(&repo, &search).await,
            vec!["Di Lee", "Cy Dunn", "Bo Chan", "Ann Lee"],
            "{}",
            dialect
        );
    }
}

#[tokio::test]
async fn backslash_in_search_value_matches_literally() {
    for dialect in DIALECTS {
        let repo = populated(dialect.clone()).await;
        for first in [r"A\B", "AB"] {
            let mut record = Record::from_attributes(repo.model(), person(first, "Roe", 1990));
            repo.create(&mut record).await.unwrap();
        }

        let mut partial = repo.search();
        partial.compare("fullName", r"A\B", true, JoinOperator::And).unwrap();
        assert_eq!(full_names(&repo, &partial).await, vec![r"A\B Roe"], "{}", dialect);

        let mut exact = repo.search();
        exact.compare("fullName", r"A\B Roe", false, JoinOperator::And).unwrap();
        assert_eq!(full_names(&repo, &exact).await, vec![r"A\B Roe"], "{}", dialect);
    }
}

#[tokio::test]
async fn partial_match_case_follows_dialect() {
    for (dialect, expected) in [
        (SqlDialect::MySql, vec!["Ann Lee", "Di Lee"]),
        (SqlDialect::Sqlite, vec!["Ann Lee", "Di Lee"]),
        (SqlDialect::PostgreSql, vec![]),
    ] {
        let repo = populated(dialect.clone()).await;
        let mut search = repo.search();
        search.compare("fullName", "lee", true, JoinOperator::And).unwrap();
        assert_eq!(full_names(&repo, &search).await, expected, "{}", dialect);
    }
}

#[tokio::test]
async fn scope_combines_with_plain_criteria() {
    let repo = populated(SqlDialect::MySql).await;
    let mut search = VirtualSearch::with_scope(
        repo.model().clone(),
        repo.dialect().clone(),
        memovirt::Criteria::raw("last = 'Lee'"),
    );
    search
        .compare("ageBracket", "adult", false, JoinOperator::And)
        .unwrap();
    assert_eq!(full_names(&repo, &search).await, vec!["Ann Lee"]);
}

#[tokio::test]
async fn unsupported_engine_and_undeclared_name() {
    let store = MemoryStore::with_dialect(SqlDialect::from_driver("oci"));
    store.create_table(TABLE, common::base_columns()).await.unwrap();
    let model = VirtualModel::builder(TABLE, VirtualConfig::packed())
        .attribute_with("fullName", full_name)
        .build()
        .unwrap();
    let repo = Repository::open(std::sync::Arc::new(store), model).await.unwrap();

    let mut search = repo.search();
    assert!(matches!(
        search.compare("fullName", "Ann", false, JoinOperator::And),
        Err(DbError::UnsupportedQueryEngine(_))
    ));
    assert!(matches!(
        search.compare("nickname", "Ann", false, JoinOperator::And),
        Err(DbError::InvalidArgument(_))
    ));
    assert!(
        repo.model()
            .codec()
            .query_expression("fullName", &SqlDialect::MySql)
            .is_ok()
    );
}

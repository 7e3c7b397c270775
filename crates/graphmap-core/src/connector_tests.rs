#[cfg(test)]
mod tests {
    use crate::connection::{ExecutionMode, GraphConnection, MemoryGraph, TransportError};
    use crate::connector::GraphConnector;
    use crate::error::GraphError;
    use crate::graph::executor::RawOptions;
    use crate::graph::traversal::Traversal;
    use crate::model::ModelDefinition;
    use async_trait::async_trait;
    use chrono::{SecondsFormat, TimeZone, Utc};
    use graphmap_common::config::AppConfig;
    use graphmap_common::{Filter, Options, PropertyType, Record, RetryPolicy};
    use proptest::prelude::*;
    use serde_json::{json, Value};
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex, Once};
    use std::time::Duration;
    use tracing_subscriber::EnvFilter;

    const CME: &str = "{\"code\":\"ConcurrentModificationException\",\"detailedMessage\":\"Failed to complete operation\"}";

    /// Fails the queued number of submissions, then hands through to a memory graph.
    struct FlakyGraph {
        inner: MemoryGraph,
        failures: Mutex<VecDeque<TransportError>>,
        attempts: AtomicUsize,
    }

    impl FlakyGraph {
        fn failing(times: usize, message: &str) -> Arc<Self> {
            Arc::new(Self {
                inner: MemoryGraph::new(),
                failures: Mutex::new((0..times).map(|_| TransportError::new(500, message)).collect()),
                attempts: AtomicUsize::new(0),
            })
        }

        fn attempts(&self) -> usize {
            self.attempts.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl GraphConnection for FlakyGraph {
        async fn submit(&self, traversal: &Traversal, mode: ExecutionMode) -> Result<Value, TransportError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            let failure = self.failures.lock().unwrap().pop_front();
            if let Some(error) = failure {
                return Err(error);
            }
            self.inner.submit(traversal, mode).await
        }

        async fn reconnect(&self) -> Result<(), TransportError> {
            self.inner.reconnect().await
        }
    }

    fn init_tracing() {
        static INIT: Once = Once::new();
        INIT.call_once(|| {
            let filter = EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("graphmap_core=debug"));
            let _ = tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_test_writer()
                .with_ansi(false)
                .try_init();
        });
    }

    fn person() -> ModelDefinition {
        ModelDefinition::vertex("Person")
            .with_column("name", PropertyType::String, "full_name")
            .with_property("age", PropertyType::Number)
            .with_property("tags", PropertyType::Array)
    }

    fn knows() -> ModelDefinition {
        ModelDefinition::edge("Knows").with_property("since", PropertyType::Number)
    }

    fn register(connector: &GraphConnector) {
        connector.register_model(person()).unwrap();
        connector.register_model(knows()).unwrap();
    }

    fn connector() -> (GraphConnector, Arc<MemoryGraph>) {
        let graph = Arc::new(MemoryGraph::new());
        let connector = GraphConnector::with_defaults(graph.clone());
        register(&connector);
        (connector, graph)
    }

    fn flaky_connector(graph: Arc<FlakyGraph>) -> GraphConnector {
        let connector = GraphConnector::with_defaults(graph);
        register(&connector);
        connector
    }

    fn record(v: Value) -> Record {
        v.as_object().cloned().unwrap()
    }

    fn none() -> Options {
        Options::default()
    }

    async fn seed_ages(connector: &GraphConnector, ages: &[i64]) {
        for (i, age) in ages.iter().enumerate() {
            connector
                .create("Person", record(json!({"id": format!("p{}", i), "age": age})), &none())
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn test_create_then_find() -> anyhow::Result<()> {
        let (connector, _) = connector();
        let id = connector
            .create("Person", record(json!({"id": "p1", "name": "Ann", "age": 30, "tags": ["a"]})), &none())
            .await?;
        assert_eq!(id, Some(json!("p1")));

        let found = connector
            .find_by_id("Person", &json!("p1"), None)
            .await?
            .ok_or_else(|| anyhow::anyhow!("p1 not found"))?;
        assert_eq!(
            Value::Object(found),
            json!({"id": "p1", "name": "Ann", "age": 30, "tags": ["a"]})
        );
        assert!(connector.exists("Person", &json!("p1")).await?);
        assert!(!connector.exists("Person", &json!("p2")).await?);
        assert!(connector.find_by_id("Person", &json!("p2"), None).await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_generated_id_is_returned() {
        let (connector, graph) = connector();
        let id = connector
            .create("Person", record(json!({"name": "Bob"})), &none())
            .await
            .unwrap()
            .unwrap();
        assert!(id.as_str().is_some_and(|s| !s.is_empty()));
        assert_eq!(graph.vertex_count(), 1);

        let all = connector.all("Person", None, &none()).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].get("id"), Some(&id));

        let stats = connector.models().type_cache().stats();
        assert_eq!((stats.entries, stats.misses), (1, 1));
        assert!(stats.hits >= 1);
    }

    #[tokio::test]
    async fn test_register_model_json() {
        let graph = Arc::new(MemoryGraph::new());
        let connector = GraphConnector::with_defaults(graph.clone());
        connector
            .register_model_json(&json!({
                "name": "City",
                "properties": {"name": {"type": "string", "neptune": {"columnName": "city_name"}}}
            }))
            .unwrap();
        connector
            .create("City", record(json!({"id": "osl", "name": "Oslo"})), &none())
            .await
            .unwrap();
        assert_eq!(
            graph.submitted(),
            vec!["g.addV('City').property(T.id,'osl').property('city_name','Oslo')".to_string()]
        );

        let err = connector.register_model_json(&json!({"name": "City"})).unwrap_err();
        assert!(err.is_validation());
    }

    #[tokio::test]
    async fn test_missing_id_rejected() {
        let (connector, graph) = connector();
        assert!(matches!(
            connector.find_by_id("Person", &Value::Null, None).await,
            Err(GraphError::MissingId)
        ));
        assert!(matches!(
            connector.replace_by_id("Person", &Value::Null, Record::new(), &none()).await,
            Err(GraphError::MissingId)
        ));
        assert!(matches!(
            connector.save("Person", record(json!({"age": 1})), &none()).await,
            Err(GraphError::MissingId)
        ));
        assert!(graph.submitted().is_empty());
    }

    #[tokio::test]
    async fn test_validation_never_reaches_server() {
        let (connector, graph) = connector();
        let err = connector
            .all("Person", Some(&Filter::with_where(json!({"name": {"near": [1, 2]}}))), &none())
            .await
            .unwrap_err();
        assert!(matches!(err, GraphError::UnsupportedOperator(_)));

        let err = connector.count("Nobody", None).await.unwrap_err();
        assert!(matches!(err, GraphError::UnknownModel(_)));

        let err = connector
            .create("Person", record(json!({"nickname": "x"})), &none())
            .await
            .unwrap_err();
        assert!(matches!(err, GraphError::UnsupportedType(_)));
        assert!(graph.submitted().is_empty());
    }

    #[tokio::test]
    async fn test_find_one_respects_order() {
        let (connector, _) = connector();
        seed_ages(&connector, &[5, 1, 3]).await;

        let filter = Filter {
            order: Some(vec!["age DESC".into()]),
            ..Default::default()
        };
        let oldest = connector.find_one("Person", Some(filter)).await.unwrap().unwrap();
        assert_eq!(oldest.get("age"), Some(&json!(5)));

        let filter = Filter::from_value(json!({"where": {"age": {"lt": 5}}, "order": "age"})).unwrap();
        let youngest = connector.find_one("Person", Some(filter)).await.unwrap().unwrap();
        assert_eq!(youngest.get("id"), Some(&json!("p1")));
    }

    #[tokio::test]
    async fn test_destroy_counts_first() {
        let (connector, graph) = connector();
        let none_gone = connector.destroy_all("Person", None).await.unwrap();
        assert_eq!(none_gone.count, 0);
        assert_eq!(graph.submitted().len(), 1);

        seed_ages(&connector, &[1, 2, 3]).await;
        let gone = connector
            .destroy_all("Person", Some(&json!({"age": {"lt": 3}})))
            .await
            .unwrap();
        assert_eq!(gone.count, 2);
        assert_eq!(connector.count("Person", None).await.unwrap(), 1);

        let gone = connector.destroy_by_id("Person", &json!("p2")).await.unwrap();
        assert_eq!(gone.count, 1);
        assert_eq!(graph.vertex_count(), 0);
    }

    #[tokio::test]
    async fn test_update_all_reports_count() {
        let (connector, graph) = connector();
        seed_ages(&connector, &[1, 2, 3]).await;

        let updated = connector
            .update_all("Person", Some(&json!({"age": {"lt": 3}})), record(json!({"name": "young", "id": "ignored"})))
            .await
            .unwrap();
        assert_eq!(updated.count, 2);
        assert_eq!(
            graph.submitted().last().unwrap(),
            "g.V().hasLabel('Person').has('age',lt(3))\
             .sideEffect(__.properties('full_name').drop()).property('full_name','young').count()"
        );

        let p0 = connector.find_by_id("Person", &json!("p0"), None).await.unwrap().unwrap();
        assert_eq!(p0.get("name"), Some(&json!("young")));
        let p2 = connector.find_by_id("Person", &json!("p2"), None).await.unwrap().unwrap();
        assert_eq!(p2.get("name"), None);

        let updated = connector
            .update("Person", Some(&json!({"age": 99})), record(json!({"name": "nobody"})))
            .await
            .unwrap();
        assert_eq!(updated.count, 0);
    }

    #[tokio::test]
    async fn test_replace_overwrites_everything() -> anyhow::Result<()> {
        let (connector, _) = connector();
        connector
            .create("Person", record(json!({"id": "p1", "name": "Ann", "age": 30})), &none())
            .await?;

        connector
            .replace_by_id("Person", &json!("p1"), record(json!({"age": 31})), &none())
            .await?;
        let found = connector.find_by_id("Person", &json!("p1"), None).await?;
        assert_eq!(found.map(Value::Object), Some(json!({"id": "p1", "age": 31})));

        connector
            .save("Person", record(json!({"id": "p1", "name": "Anna"})), &none())
            .await?;
        let found = connector.find_by_id("Person", &json!("p1"), None).await?;
        assert_eq!(found.map(Value::Object), Some(json!({"id": "p1", "name": "Anna"})));
        Ok(())
    }

    #[tokio::test]
    async fn test_edge_lifecycle() {
        let (connector, graph) = connector();
        seed_ages(&connector, &[20, 30]).await;

        let edge_id = connector
            .create("Knows", record(json!({"from": "Person/p0", "to": "Person/p1", "since": 2020})), &none())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            graph.submitted().last().unwrap(),
            "g.V('p0').hasLabel('Person').addE('Knows').to(__.V('p1').hasLabel('Person')).property('since',2020)"
        );

        let edges = connector.all("Knows", None, &none()).await.unwrap();
        assert_eq!(
            edges,
            vec![record(json!({"id": edge_id, "from": "Person/p0", "to": "Person/p1", "since": 2020}))]
        );

        connector.destroy_by_id("Person", &json!("p0")).await.unwrap();
        assert_eq!(graph.edge_count(), 0);
    }

    #[tokio::test]
    async fn test_edge_reference_errors_before_submission() {
        let (connector, graph) = connector();
        let err = connector
            .create("Knows", record(json!({"from": "Person/p0"})), &none())
            .await
            .unwrap_err();
        assert!(matches!(err, GraphError::MissingReference("to")));

        let err = connector
            .create("Knows", record(json!({"from": "p0", "to": "Person/p1"})), &none())
            .await
            .unwrap_err();
        assert!(matches!(err, GraphError::InvalidReferenceFormat { field: "from", .. }));
        assert!(graph.submitted().is_empty());
    }

    #[tokio::test]
    async fn test_edge_to_missing_vertex_is_a_server_error() {
        let (connector, graph) = connector();
        seed_ages(&connector, &[20]).await;
        let err = connector
            .create("Knows", record(json!({"from": "Person/p0", "to": "Person/ghost"})), &none())
            .await
            .unwrap_err();
        assert!(matches!(err, GraphError::Transport(_)));
        assert_eq!(graph.edge_count(), 0);
    }

    #[tokio::test]
    async fn test_raw_execute_modes() {
        let (connector, _) = connector();
        seed_ages(&connector, &[5]).await;

        let count = Traversal::g().v(vec![]).count();
        let parsed = connector
            .raw_execute(count.clone(), &RawOptions { method: Some("next".into()), ..Default::default() })
            .await
            .unwrap();
        assert_eq!(parsed, json!(1));

        let raw = connector
            .raw_execute(
                count.clone(),
                &RawOptions { method: Some("next".into()), parse: Some(false), ..Default::default() },
            )
            .await
            .unwrap();
        assert_eq!(raw, json!({"@type": "g:Int64", "@value": 1}));

        let listed = connector.raw_execute(count.clone(), &RawOptions::default()).await.unwrap();
        assert_eq!(listed, json!([1]));

        let err = connector
            .raw_execute(count, &RawOptions { method: Some("first".into()), ..Default::default() })
            .await
            .unwrap_err();
        assert!(matches!(err, GraphError::InvalidExecutionMode(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failures_are_retried() {
        init_tracing();
        let graph = FlakyGraph::failing(2, CME);
        let connector = flaky_connector(graph.clone());

        let started = tokio::time::Instant::now();
        let id = connector
            .create("Person", record(json!({"id": "p1"})), &none())
            .await
            .unwrap();
        assert_eq!(id, Some(json!("p1")));
        assert_eq!(graph.attempts(), 3);
        assert!(started.elapsed() >= Duration::from_millis(200));
        assert_eq!(graph.inner.vertex_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_only_violation_is_retried() {
        let graph = FlakyGraph::failing(1, "ReadOnlyViolationException: writer moved");
        let connector = flaky_connector(graph.clone());
        assert_eq!(connector.count("Person", None).await.unwrap(), 0);
        assert_eq!(graph.attempts(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_budget_is_per_model() {
        init_tracing();
        let graph = FlakyGraph::failing(10, CME);
        let connector = GraphConnector::with_defaults(graph.clone());
        connector
            .register_model(person().with_retry(RetryPolicy { max_retries: 1, delay_ms: 10 }))
            .unwrap();

        let err = connector.count("Person", None).await.unwrap_err();
        let transport = err.transport().expect("transport failure");
        assert!(transport.message().contains("ConcurrentModificationException"));
        assert!(!err.is_validation());
        assert_eq!(graph.attempts(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_configured_default_retry() {
        let graph = FlakyGraph::failing(10, CME);
        let mut config = AppConfig::default();
        config.retry.max_retries = 0;
        let connector = GraphConnector::new(graph.clone(), &config);
        register(&connector);

        assert!(connector.count("Person", None).await.is_err());
        assert_eq!(graph.attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fatal_failures_surface_immediately() {
        let graph = FlakyGraph::failing(1, "MalformedQueryException: bad step");
        let connector = flaky_connector(graph.clone());
        assert!(matches!(connector.count("Person", None).await, Err(GraphError::Transport(_))));
        assert_eq!(graph.attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_raw_execute_never_retries() {
        let graph = FlakyGraph::failing(1, CME);
        let connector = flaky_connector(graph.clone());
        let err = connector
            .raw_execute(Traversal::g().v(vec![]).count(), &RawOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, GraphError::Transport(_)));
        assert_eq!(graph.attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_closed_socket_reconnects_then_retries() {
        init_tracing();
        let graph = FlakyGraph::failing(1, "WebSocket is not open: readyState 3 (CLOSED)");
        let connector = flaky_connector(graph.clone());
        assert_eq!(connector.count("Person", None).await.unwrap(), 0);
        assert_eq!(graph.attempts(), 2);
        assert_eq!(graph.inner.reconnects(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transaction_commit_submits_once() {
        init_tracing();
        let (connector, graph) = connector();
        let tx = connector.begin_transaction().await;
        let opts = Options::in_transaction(&tx);

        let id = connector
            .create("Person", record(json!({"id": "a", "age": 1})), &opts)
            .await
            .unwrap();
        assert_eq!(id, None);
        connector
            .create("Person", record(json!({"id": "b", "age": 2})), &opts)
            .await
            .unwrap();
        connector
            .create("Knows", record(json!({"from": "Person/a", "to": "Person/b"})), &opts)
            .await
            .unwrap();
        assert!(graph.submitted().is_empty());

        connector.commit(&tx).await.unwrap();
        assert_eq!(graph.submitted().len(), 1);
        assert_eq!(connector.count("Person", None).await.unwrap(), 2);
        assert_eq!(graph.edge_count(), 1);

        assert!(matches!(connector.commit(&tx).await, Err(GraphError::TransactionNotFound(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_under_transaction_leaves_pending_alone() {
        let (connector, graph) = connector();
        seed_ages(&connector, &[10, 20, 30]).await;

        let tx = connector.begin_transaction().await;
        let opts = Options::in_transaction(&tx);
        let seen = connector.all("Person", None, &opts).await.unwrap();
        assert_eq!(seen.len(), 3);

        connector
            .create("Person", record(json!({"id": "late", "age": 5})), &opts)
            .await
            .unwrap();
        connector.all("Person", None, &opts).await.unwrap();
        connector.commit(&tx).await.unwrap();

        assert_eq!(
            graph.submitted().last().unwrap(),
            "g.addV('Person').property(T.id,'late').property('age',5)"
        );
        assert_eq!(graph.vertex_count(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transaction_replace_continues_pending() {
        let (connector, graph) = connector();
        seed_ages(&connector, &[10]).await;

        let tx = connector.begin_transaction().await;
        let opts = Options::in_transaction(&tx);
        connector
            .create("Person", record(json!({"id": "new", "age": 1})), &opts)
            .await
            .unwrap();
        connector
            .replace_by_id("Person", &json!("p0"), record(json!({"age": 11})), &opts)
            .await
            .unwrap();
        connector.commit(&tx).await.unwrap();

        assert_eq!(
            graph.submitted().last().unwrap(),
            "g.addV('Person').property(T.id,'new').property('age',1)\
             .V('p0').hasLabel('Person').sideEffect(__.properties().drop()).property('age',11)"
        );
        let p0 = connector.find_by_id("Person", &json!("p0"), None).await.unwrap().unwrap();
        assert_eq!(p0.get("age"), Some(&json!(11)));
        assert_eq!(graph.vertex_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_commit_is_a_no_op() {
        let (connector, graph) = connector();
        let tx = connector.begin_transaction().await;
        connector.commit(&tx).await.unwrap();
        assert!(graph.submitted().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rollback_discards_pending() {
        let (connector, graph) = connector();
        let tx = connector.begin_transaction().await;
        connector
            .create("Person", record(json!({"id": "a"})), &Options::in_transaction(&tx))
            .await
            .unwrap();

        connector.rollback(&tx).await;
        connector.rollback(&tx).await;
        assert!(graph.submitted().is_empty());
        assert!(matches!(connector.commit(&tx).await, Err(GraphError::TransactionNotFound(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_transaction_expires() {
        init_tracing();
        let graph = Arc::new(MemoryGraph::new());
        let mut config = AppConfig::default();
        config.transaction.clear_timeout_ms = 1000;
        let connector = GraphConnector::new(graph.clone(), &config);
        register(&connector);

        let tx = connector.begin_transaction().await;
        let opts = Options::in_transaction(&tx);
        connector
            .create("Person", record(json!({"id": "a"})), &opts)
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(1001)).await;
        let err = connector
            .create("Person", record(json!({"id": "b"})), &opts)
            .await
            .unwrap_err();
        assert!(matches!(err, GraphError::TransactionNotFound(_)));
        assert!(matches!(connector.commit(&tx).await, Err(GraphError::TransactionNotFound(_))));
        assert!(graph.submitted().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_commit_is_not_retried() {
        let graph = FlakyGraph::failing(1, CME);
        let connector = flaky_connector(graph.clone());
        let tx = connector.begin_transaction().await;
        connector
            .create("Person", record(json!({"id": "a"})), &Options::in_transaction(&tx))
            .await
            .unwrap();

        assert!(matches!(connector.commit(&tx).await, Err(GraphError::Transport(_))));
        assert_eq!(graph.attempts(), 1);
        assert_eq!(graph.inner.vertex_count(), 0);
    }

    #[derive(Debug, Clone)]
    enum AgeClause {
        Eq(i64),
        Neq(i64),
        Gt(i64),
        Gte(i64),
        Lt(i64),
        Lte(i64),
        Inq(Vec<i64>),
        Nin(Vec<i64>),
        Between(i64, i64),
    }

    impl AgeClause {
        fn to_json(&self) -> Value {
            match self {
                AgeClause::Eq(n) => json!({"age": n}),
                AgeClause::Neq(n) => json!({"age": {"neq": n}}),
                AgeClause::Gt(n) => json!({"age": {"gt": n}}),
                AgeClause::Gte(n) => json!({"age": {"gte": n}}),
                AgeClause::Lt(n) => json!({"age": {"lt": n}}),
                AgeClause::Lte(n) => json!({"age": {"lte": n}}),
                AgeClause::Inq(ns) => json!({"age": {"inq": ns}}),
                AgeClause::Nin(ns) => json!({"age": {"nin": ns}}),
                AgeClause::Between(lo, hi) => json!({"age": {"between": [lo, hi]}}),
            }
        }

        fn matches(&self, age: i64) -> bool {
            match self {
                AgeClause::Eq(n) => age == *n,
                AgeClause::Neq(n) => age != *n,
                AgeClause::Gt(n) => age > *n,
                AgeClause::Gte(n) => age >= *n,
                AgeClause::Lt(n) => age < *n,
                AgeClause::Lte(n) => age <= *n,
                AgeClause::Inq(ns) => ns.contains(&age),
                AgeClause::Nin(ns) => !ns.contains(&age),
                AgeClause::Between(lo, hi) => *lo <= age && age < *hi,
            }
        }
    }

    fn age_clause() -> impl Strategy<Value = AgeClause> {
        let n = 0i64..20;
        prop_oneof![
            n.clone().prop_map(AgeClause::Eq),
            n.clone().prop_map(AgeClause::Neq),
            n.clone().prop_map(AgeClause::Gt),
            n.clone().prop_map(AgeClause::Gte),
            n.clone().prop_map(AgeClause::Lt),
            n.clone().prop_map(AgeClause::Lte),
            prop::collection::vec(n.clone(), 1..4).prop_map(AgeClause::Inq),
            prop::collection::vec(n.clone(), 1..4).prop_map(AgeClause::Nin),
            (n.clone(), n).prop_map(|(lo, hi)| AgeClause::Between(lo, hi)),
        ]
    }

    fn block_on<F: std::future::Future>(future: F) -> F::Output {
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap()
            .block_on(future)
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn prop_where_clause_matches_oracle(
            ages in prop::collection::vec(0i64..20, 0..10),
            first in age_clause(),
            second in age_clause(),
            combinator in 0u8..3,
        ) {
            let (clause, expected) = match combinator {
                0 => (first.to_json(), ages.iter().filter(|a| first.matches(**a)).count()),
                1 => (
                    json!({"and": [first.to_json(), second.to_json()]}),
                    ages.iter().filter(|a| first.matches(**a) && second.matches(**a)).count(),
                ),
                _ => (
                    json!({"or": [first.to_json(), second.to_json()]}),
                    ages.iter().filter(|a| first.matches(**a) || second.matches(**a)).count(),
                ),
            };

            let (counted, listed) = block_on(async {
                let (connector, _) = connector();
                seed_ages(&connector, &ages).await;
                let counted = connector.count("Person", Some(&clause)).await.unwrap();
                let listed = connector
                    .all("Person", Some(&Filter::with_where(clause.clone())), &none())
                    .await
                    .unwrap();
                (counted, listed)
            });

            prop_assert_eq!(counted as usize, expected);
            prop_assert_eq!(listed.len(), expected);
            for r in &listed {
                let age = r.get("age").and_then(Value::as_i64).unwrap();
                let matched = match combinator {
                    0 => first.matches(age),
                    1 => first.matches(age) && second.matches(age),
                    _ => first.matches(age) || second.matches(age),
                };
                prop_assert!(matched);
            }
        }

        #[test]
        fn prop_stored_record_reads_back(
            name in "[a-zA-Z' ]{0,16}",
            age in -1_000_000_000i64..1_000_000_000,
            active in any::<bool>(),
            tags in prop::collection::vec("[a-z]{0,5}", 0..4),
            city in "[a-zA-Z\"]{1,8}",
            born_ms in 0i64..4_000_000_000_000,
        ) {
            let born = Utc
                .timestamp_millis_opt(born_ms)
                .unwrap()
                .to_rfc3339_opts(SecondsFormat::Millis, true);
            let written = json!({
                "id": "r1",
                "name": name,
                "age": age,
                "active": active,
                "tags": tags,
                "address": {"city": city},
                "born": born,
            });

            let read = block_on(async {
                let connector = GraphConnector::with_defaults(Arc::new(MemoryGraph::new()));
                connector
                    .register_model(
                        ModelDefinition::vertex("Profile")
                            .with_column("name", PropertyType::String, "display_name")
                            .with_property("age", PropertyType::Number)
                            .with_property("active", PropertyType::Boolean)
                            .with_property("tags", PropertyType::Array)
                            .with_property("address", PropertyType::Object)
                            .with_property("born", PropertyType::Date),
                    )
                    .unwrap();
                connector.create("Profile", record(written.clone()), &none()).await.unwrap();
                connector.find_by_id("Profile", &json!("r1"), None).await.unwrap()
            });

            prop_assert_eq!(read.map(Value::Object), Some(written));
        }
    }
}

/// Lightweight test harness for fleet-level integration tests
///
/// Spins up one liveness server per topology path on an in-memory
/// transport, so probes, bulk checks and monitors can be exercised
/// in-process without sockets.
///
/// # Example
///
/// ```rust,ignore
/// use common::testkit::TestFleet;
///
/// #[tokio::test]
/// async fn test_bulk_check() -> anyhow::Result<()> {
///     let mut fleet = TestFleet::from_paths(&["api/server1", "api/server2"]).await?;
///
///     // Take one server down
///     fleet.kill("api/server2").await?;
///
///     let results = fleet
///         .prober()
///         .bulk_check(&fleet.targets(), &Default::default())
///         .await;
///     assert!(results[0].success());
///     assert!(!results[1].success());
///
///     fleet.shutdown().await?;
///     Ok(())
/// }
/// ```
mod fleet;
mod server;

pub use fleet::TestFleet;
pub use server::TestServer;

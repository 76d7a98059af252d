//! Mock storage contract tests.
//!
//! The in-memory backend backs the unit tests, so it must honor the same
//! contract as the SQL backends.

mod storage;

use handreceipt_custody::storage::MockCustodyStore;

#[tokio::test]
async fn test_mock_custody_store() {
    println!("=== Mock CustodyStore Tests ===");

    let store = MockCustodyStore::new();
    run_custody_store_tests!(&store);

    println!("=== All Mock CustodyStore tests PASSED ===");
}

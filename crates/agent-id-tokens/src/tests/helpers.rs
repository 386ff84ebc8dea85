//! Test helpers for token service tests.

use crate::*;
use agent_id_storage::RocksDbStorage;
use std::sync::Arc;
use uuid::Uuid;

pub const TEST_SECRET: &[u8] = b"0123456789abcdef0123456789abcdef-test";

pub fn test_config() -> TokenConfig {
    let mut config = TokenConfig::new(TEST_SECRET);
    config.issuer = "agent-id.test".to_string();
    config.sdk_issuer = "agent-id-sdk.test".to_string();
    config.leeway = 0;
    config
}

pub fn create_test_service() -> TokenService {
    TokenService::new(test_config()).unwrap()
}

pub fn create_test_revocations() -> RevocationList<RocksDbStorage> {
    RevocationList::new(Arc::new(RocksDbStorage::open_test().unwrap()))
}

pub fn test_user() -> Principal {
    Principal::User {
        user_id: Uuid::new_v4(),
        organization_id: Uuid::new_v4(),
        role: "admin".to_string(),
    }
}

pub fn test_agent() -> Principal {
    Principal::Agent {
        agent_id: Uuid::new_v4(),
        organization_id: Uuid::new_v4(),
        agent_name: "billing-bot".to_string(),
    }
}

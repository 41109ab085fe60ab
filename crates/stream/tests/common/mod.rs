use rowstream_common::record::USER_COLUMNS;
use rowstream_common::{ConnectionConfig, UserRecord, USER_TABLE};
use rowstream_connector_memory::{MemoryDatabase, MemorySource};
use rowstream_stream::ConnectionProvider;

/// A `user_data` table holding one user per age, in order.
pub fn users_with_ages(ages: &[u32]) -> (MemoryDatabase, ConnectionProvider<MemorySource>) {
    let config = ConnectionConfig::default();
    let db = MemoryDatabase::new(&config);
    db.create_table(USER_TABLE, &USER_COLUMNS);
    for (i, age) in ages.iter().enumerate() {
        let user = UserRecord {
            user_id: format!("00000000-0000-0000-0000-{:012}", i + 1),
            name: format!("User {}", i + 1),
            email: format!("user{}@example.com", i + 1),
            age: *age,
        };
        db.insert(USER_TABLE, &user.to_record()).unwrap();
    }
    (db.clone(), ConnectionProvider::new(db.source(&config)))
}

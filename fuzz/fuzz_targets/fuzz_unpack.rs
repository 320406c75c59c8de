#![no_main]

use libfuzzer_sys::fuzz_target;
use replica_archive::core::archive::{Archive, SerializeContext};
use replica_archive::core::serializer::Serializable;
use replica_archive::properties::{
    ContentTable, PropertyInfoTable, PropertyRegistry, ReplicatedPropertyCollection,
};
use replica_archive::records::EnterGameWorldArchive;
use std::sync::Arc;

fuzz_target!(|data: &[u8]| {
    // Hostile archives must fail cleanly, never panic or over-allocate
    let Ok(infos) = PropertyInfoTable::builtin() else {
        return;
    };
    let content = Arc::new(ContentTable::new());
    let registry = Arc::new(PropertyRegistry::new(infos, content.clone()));

    for context in [
        SerializeContext::Replication,
        SerializeContext::Database,
        SerializeContext::Migration,
    ] {
        if let Ok(mut archive) = Archive::unpacking(context, data.to_vec()) {
            let mut props = ReplicatedPropertyCollection::new(Arc::clone(&registry));
            let _ = props.serialize(&mut archive);
        }
    }

    if let Ok(mut archive) = Archive::unpacking(SerializeContext::Replication, data.to_vec()) {
        let mut record = EnterGameWorldArchive::new(content);
        let _ = record.serialize(&mut archive);
    }
});

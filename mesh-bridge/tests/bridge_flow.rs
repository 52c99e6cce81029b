//! Bridge session lifecycle across process restarts.

use mesh_bridge::{BridgeFileConfig, MemoryMeshBridge};
use mesh_core::Category;

fn config_for(dir: &std::path::Path, extra: &str) -> BridgeFileConfig {
    let toml = format!(
        "[persistence]\nmemory_dir = {:?}\n\n[consolidation]\nauto_consolidate = false\n{extra}",
        dir.display().to_string()
    );
    BridgeFileConfig::from_toml(&toml).expect("config")
}

#[test]
fn session_survives_restart() {
    let dir = tempfile::tempdir().expect("tempdir");

    {
        let bridge = MemoryMeshBridge::open(config_for(dir.path(), "")).expect("open");
        bridge.store("name", "The user is called Everett").expect("store");
        bridge.store("goal", "Everett wants to learn Python").expect("store");
        bridge.store("drink", "I prefer green tea").expect("store");
        assert!(!bridge.get_memory_stats().memory_file_exists);
        bridge.save().expect("save");
    }

    let bridge = MemoryMeshBridge::open(config_for(dir.path(), "")).expect("reopen");
    let stats = bridge.get_memory_stats();
    assert!(stats.memory_file_exists);
    assert_eq!(stats.long_term_memories, 3);
    assert_eq!(stats.session_memories, 0);
    assert_eq!(stats.mesh.categories.get(&Category::Learning), Some(&1));
    assert_eq!(stats.mesh.categories.get(&Category::Preferences), Some(&1));

    let recalled = bridge.retrieve_relevant("python");
    assert_eq!(recalled, "[learning] goal: Everett wants to learn Python");
    assert_eq!(
        bridge.get_category_context(Category::Preferences),
        "drink: I prefer green tea"
    );
}

#[test]
fn file_config_drives_formatting() {
    let dir = tempfile::tempdir().expect("tempdir");
    let extra = concat!(
        "\n[bridge]\nretrieve_limit = 1\ndelimiter = \" ; \"\n",
        "high_importance_keywords = [\"urgent\"]\n",
    );
    let config = config_for(dir.path(), extra);
    let bridge = MemoryMeshBridge::open(config).expect("open");

    assert!((bridge.importance_for("urgent: call back") - 0.8).abs() < f32::EPSILON);
    assert!((bridge.importance_for("remember the milk") - 0.5).abs() < f32::EPSILON);

    bridge.store("a", "tea in the morning").expect("store");
    bridge.store("b", "tea at night").expect("store");
    assert_eq!(bridge.retrieve_relevant("tea").split(" ; ").count(), 1);
    assert_eq!(bridge.get_working_context(), "a: tea in the morning ; b: tea at night");
}

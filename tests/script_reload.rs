use ember_engine::config::ScriptConfig;
use ember_engine::scene::EntityId;
use ember_engine::scripting::reflection::{FieldType, FieldValue};
use ember_engine::scripting::ScriptEngine;
use std::fs;
use tempfile::TempDir;

const CORE_SRC: &str = r#"
export const Entity = #{
    _namespace: "Ember",
    _name: "Entity",
};

fn Entity_init(me, id) {
    me._id = id;
}
"#;

fn setup(client_src: &str) -> (TempDir, ScriptConfig) {
    let dir = tempfile::tempdir().expect("temp dir");
    let core = dir.path().join("core.rhai");
    let client = dir.path().join("game.rhai");
    fs::write(&core, CORE_SRC).expect("write core assembly");
    fs::write(&client, client_src).expect("write client assembly");
    (dir, ScriptConfig { core_assembly: core, client_assembly: client, auto_reload: false })
}

fn rewrite_client(config: &ScriptConfig, src: &str) {
    fs::write(&config.client_assembly, src).expect("rewrite client assembly");
}

#[test]
fn reload_with_unchanged_sources_is_idempotent() {
    let (_dir, config) = setup(
        r#"
        export const Foo = #{
            _namespace: "Game",
            _name: "Foo",
            _parent: "Ember.Entity",
            health: 100,
        };
        "#,
    );
    let mut engine = ScriptEngine::new(config).expect("engine init");
    let entity = EntityId::generate();
    engine.create_instance(entity, "Game.Foo").expect("instance");
    assert!(engine.set_field(entity, "Game.Foo", "health", FieldValue::Int(55)));

    let names_before = engine.class_names();
    engine.reload_domain().expect("first reload");
    assert_eq!(engine.class_names(), names_before, "class table must be stable across reload");
    engine.reload_domain().expect("second reload");
    assert_eq!(engine.class_names(), names_before);

    let health = engine.field_value(entity, "Game.Foo", "health").expect("field after reload");
    assert_eq!(health.as_int(), Some(55), "unchanged field must keep its value across reload");
    assert!(engine.get_instance(entity, "Game.Foo").expect("instance survives").is_live());
}

#[test]
fn reload_migrates_matching_fields_and_resets_the_rest() {
    let (_dir, config) = setup(
        r#"
        export const Foo = #{
            _namespace: "Game",
            _name: "Foo",
            _parent: "Ember.Entity",
            health: 100,
            tag: 7,
            label: "alpha",
        };
        "#,
    );
    let mut engine = ScriptEngine::new(config).expect("engine init");
    let entity = EntityId::generate();
    engine.create_instance(entity, "Game.Foo").expect("instance");
    assert!(engine.set_field(entity, "Game.Foo", "health", FieldValue::Int(64)));
    assert!(engine.set_field(entity, "Game.Foo", "label", FieldValue::Str("renamed".into())));

    // Source edit: `speed` appears, `tag` changes type, the rest is stable.
    rewrite_client(
        engine.config(),
        r#"
        export const Foo = #{
            _namespace: "Game",
            _name: "Foo",
            _parent: "Ember.Entity",
            health: 100,
            tag: "retyped",
            label: "alpha",
            speed: 0.5,
        };
        "#,
    );
    engine.reload_domain().expect("reload after source edit");

    let fields = engine.fields(entity, "Game.Foo").expect("fields after reload");
    assert_eq!(fields.len(), 4);

    let health = engine.field_value(entity, "Game.Foo", "health").expect("health");
    assert_eq!(health.as_int(), Some(64), "same name and type keeps its value");

    let speed = engine.field_value(entity, "Game.Foo", "speed").expect("speed");
    assert_eq!(speed.as_float(), Some(0.5), "new field starts from the class default");

    let tag = engine.field_value(entity, "Game.Foo", "tag").expect("tag");
    assert_eq!(tag.field_type(), FieldType::Str);
    assert_eq!(tag.as_str(), Some("retyped"), "type change resets to the new default");

    // The carried value must stay valid after reconciliation returns: the
    // payload moves into the new field, no transient buffer is involved.
    let label = engine.field_value(entity, "Game.Foo", "label").expect("label");
    assert_eq!(label.as_str(), Some("renamed"));
}

#[test]
fn vanished_class_detaches_bindings_without_failing_the_reload() {
    let (_dir, config) = setup(
        r#"
        export const Foo = #{
            _namespace: "Game",
            _name: "Foo",
            _parent: "Ember.Entity",
            health: 100,
        };
        export const Bar = #{
            _namespace: "Game",
            _name: "Bar",
            _parent: "Ember.Entity",
            level: 1,
        };
        "#,
    );
    let mut engine = ScriptEngine::new(config).expect("engine init");
    let entity = EntityId::generate();
    engine.create_instance(entity, "Game.Foo").expect("foo instance");
    engine.create_instance(entity, "Game.Bar").expect("bar instance");

    rewrite_client(
        engine.config(),
        r#"
        export const Foo = #{
            _namespace: "Game",
            _name: "Foo",
            _parent: "Ember.Entity",
            health: 100,
        };
        "#,
    );
    engine.reload_domain().expect("reload must not fail when a class vanishes");

    assert!(!engine.has_class("Game.Bar"));
    assert!(engine.get_instance(entity, "Game.Bar").is_none(), "binding to vanished class detaches");
    assert!(engine.get_instance(entity, "Game.Foo").is_some());
}

#[test]
fn reload_lands_in_edit_mode_with_a_fresh_runtime_map() {
    let (_dir, config) = setup(
        r#"
        export const Foo = #{
            _namespace: "Game",
            _name: "Foo",
            _parent: "Ember.Entity",
            health: 100,
        };
        "#,
    );
    let mut engine = ScriptEngine::new(config).expect("engine init");
    let entity = EntityId::generate();
    engine.create_instance(entity, "Game.Foo").expect("instance");

    engine.on_runtime_begin();
    engine.reload_domain().expect("reload during play mode");
    assert_eq!(engine.mode(), ember_engine::scripting::ExecutionMode::Edit);
    assert!(engine.get_instance(entity, "Game.Foo").is_some(), "edit binding survives");
}

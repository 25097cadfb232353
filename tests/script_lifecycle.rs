use ember_engine::config::ScriptConfig;
use ember_engine::scene::EntityId;
use ember_engine::scripting::reflection::FieldValue;
use ember_engine::scripting::{ExecutionMode, ScriptEngine};
use rhai::Dynamic;
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

const CLIENT_SRC: &str = r#"
export const Foo = #{
    _namespace: "Game",
    _name: "Foo",
    _parent: "Ember.Entity",
    health: 100,
    created: false,
};

fn Foo_on_create(me) {
    me.created = true;
}

fn Foo_on_update(me, dt) {
    me.health += 1;
}

fn Foo_get_health(me) {
    me.health
}

fn Foo_set_health(me, value) {
    me.health = value;
}

export const Quiet = #{
    _namespace: "Game",
    _name: "Quiet",
    _parent: "Ember.Entity",
    ticks: 0,
};
"#;

fn setup() -> (TempDir, ScriptEngine) {
    let dir = tempfile::tempdir().expect("temp dir");
    let core = dir.path().join("core.rhai");
    let client = dir.path().join("game.rhai");
    fs::write(&core, CORE_SRC).expect("write core assembly");
    fs::write(&client, CLIENT_SRC).expect("write client assembly");
    let engine =
        ScriptEngine::new(ScriptConfig { core_assembly: core, client_assembly: client, auto_reload: false })
            .expect("engine init");
    (dir, engine)
}

#[test]
fn runtime_copies_leave_edit_instances_untouched() {
    let (_dir, mut engine) = setup();
    let entity = EntityId::generate();
    engine.create_instance(entity, "Game.Foo").expect("instance");
    assert!(engine.set_field(entity, "Game.Foo", "health", FieldValue::Int(10)));
    let edit_handle = engine.get_instance(entity, "Game.Foo").expect("edit instance").handle();

    engine.on_runtime_begin();
    assert_eq!(engine.mode(), ExecutionMode::Runtime);
    let runtime_handle = engine.get_instance(entity, "Game.Foo").expect("runtime copy").handle();
    assert_ne!(edit_handle, runtime_handle, "runtime copy must be an independent object");

    assert!(engine.set_field(entity, "Game.Foo", "health", FieldValue::Int(99)));
    engine.update(0.016);
    engine.on_runtime_end();

    assert_eq!(engine.mode(), ExecutionMode::Edit);
    let instance = engine.get_instance(entity, "Game.Foo").expect("edit instance after play");
    assert_eq!(instance.handle(), edit_handle, "edit instance identity is preserved");
    let health = engine.field_value(entity, "Game.Foo", "health").expect("health");
    assert_eq!(health.as_int(), Some(10), "play-mode mutation must not leak into edit state");
}

#[test]
fn runtime_copies_start_from_edited_field_state() {
    let (_dir, mut engine) = setup();
    let entity = EntityId::generate();
    engine.create_instance(entity, "Game.Foo").expect("instance");
    assert!(engine.set_field(entity, "Game.Foo", "health", FieldValue::Int(42)));

    engine.on_runtime_begin();
    let health = engine.field_value(entity, "Game.Foo", "health").expect("runtime health");
    assert_eq!(health.as_int(), Some(42), "edited state seeds the runtime copy");
    engine.on_runtime_end();
}

#[test]
fn lifecycle_callbacks_mutate_live_state() {
    let (_dir, mut engine) = setup();
    let entity = EntityId::generate();
    engine.create_instance(entity, "Game.Foo").expect("instance");

    engine.invoke_on_create(entity, "Game.Foo");
    let created = engine.field_value(entity, "Game.Foo", "created").expect("created flag");
    assert_eq!(created.as_bool(), Some(true));

    engine.update(0.016);
    engine.update(0.016);
    let health = engine.field_value(entity, "Game.Foo", "health").expect("health");
    assert_eq!(health.as_int(), Some(102));
}

#[test]
fn missing_lifecycle_methods_are_noops() {
    let (_dir, mut engine) = setup();
    let entity = EntityId::generate();
    engine.create_instance(entity, "Game.Quiet").expect("instance");

    engine.invoke_on_create(entity, "Game.Quiet");
    engine.invoke_on_destroy(entity, "Game.Quiet");
    engine.update(0.016);

    let instance = engine.get_instance(entity, "Game.Quiet").expect("instance");
    assert!(instance.is_live());
    let ticks = engine.field_value(entity, "Game.Quiet", "ticks").expect("ticks");
    assert_eq!(ticks.as_int(), Some(0));
}

#[test]
fn removed_instances_do_not_resolve() {
    let (_dir, mut engine) = setup();
    let entity = EntityId::generate();
    engine.create_instance(entity, "Game.Foo").expect("instance");
    assert_eq!(engine.live_handles(), 1);

    engine.remove_instance(entity, "Game.Foo");
    assert!(engine.get_instance(entity, "Game.Foo").is_none());
    assert_eq!(engine.live_handles(), 0, "removal releases the managed pin");

    // Removing again is a quiet no-op.
    engine.remove_instance(entity, "Game.Foo");
}

#[test]
fn property_accessors_round_trip() {
    let (_dir, mut engine) = setup();
    let entity = EntityId::generate();
    let handle = engine
        .create_instance(entity, "Game.Foo")
        .expect("instance")
        .handle()
        .expect("live handle");

    let property = engine.get_property("Game.Foo", "health").expect("health property");
    engine.set_property(handle, &property, vec![Dynamic::from(77_i64)]);
    let value = engine.invoke_getter(handle, &property).expect("getter result");
    assert_eq!(value.as_int().ok(), Some(77));

    let live = engine.field_value(entity, "Game.Foo", "health").expect("health field");
    assert_eq!(live.as_int(), Some(77), "setter writes into the live object");

    assert!(engine.get_property("Game.Foo", "missing").is_none());
}

#[test]
fn field_writes_with_wrong_type_are_rejected() {
    let (_dir, mut engine) = setup();
    let entity = EntityId::generate();
    engine.create_instance(entity, "Game.Foo").expect("instance");

    assert!(!engine.set_field(entity, "Game.Foo", "health", FieldValue::Str("oops".into())));
    let health = engine.field_value(entity, "Game.Foo", "health").expect("health");
    assert_eq!(health.as_int(), Some(100));
}

#[test]
fn rebinding_the_same_class_releases_the_displaced_pin() {
    let (_dir, mut engine) = setup();
    let entity = EntityId::generate();
    let first = engine.create_instance(entity, "Game.Foo").expect("instance").handle();
    let second = engine.create_instance(entity, "Game.Foo").expect("instance").handle();
    assert_ne!(first, second, "rebinding constructs a fresh object");
    assert_eq!(engine.live_handles(), 1, "the displaced instance must give its pin back");
}

#[test]
fn reentering_runtime_mode_does_not_leak_pins() {
    let (_dir, mut engine) = setup();
    let entity = EntityId::generate();
    engine.create_instance(entity, "Game.Foo").expect("instance");

    engine.on_runtime_begin();
    engine.on_runtime_begin();
    assert_eq!(engine.live_handles(), 2, "one edit pin plus one runtime pin");

    engine.on_runtime_end();
    assert_eq!(engine.live_handles(), 1);
    engine.on_runtime_end();
    assert_eq!(engine.live_handles(), 1);
}

use ember_engine::config::ScriptConfig;
use ember_engine::scene::Scene;
use ember_engine::scripting::{ExecutionMode, ScriptEngine};
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
export const Spinner = #{
    _namespace: "Game",
    _name: "Spinner",
    _parent: "Ember.Entity",
    angle: 0.0,
    created: false,
    destroyed: false,
};

fn Spinner_on_create(me) {
    me.created = true;
}

fn Spinner_on_update(me, dt) {
    me.angle += dt;
}

fn Spinner_on_destroy(me) {
    me.destroyed = true;
}
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
fn scene_drives_the_full_play_mode_cycle() {
    let (_dir, mut engine) = setup();
    let mut scene = Scene::new();
    let (_entity, id) = scene.spawn_scripted("Game.Spinner");

    scene.bind_scripts(&mut engine);
    assert!(engine.get_instance(id, "Game.Spinner").is_some(), "binding creates an edit instance");

    scene.on_runtime_start(&mut engine);
    assert_eq!(engine.mode(), ExecutionMode::Runtime);
    let created = engine.field_value(id, "Game.Spinner", "created").expect("created flag");
    assert_eq!(created.as_bool(), Some(true));

    scene.update(&engine, 0.5);
    scene.update(&engine, 0.25);
    let angle = engine.field_value(id, "Game.Spinner", "angle").expect("angle");
    assert_eq!(angle.as_float(), Some(0.75));

    scene.on_runtime_stop(&mut engine);
    assert_eq!(engine.mode(), ExecutionMode::Edit);
    let angle = engine.field_value(id, "Game.Spinner", "angle").expect("edit angle");
    assert_eq!(angle.as_float(), Some(0.0), "play-mode motion never touches edit state");
    let created = engine.field_value(id, "Game.Spinner", "created").expect("edit created");
    assert_eq!(created.as_bool(), Some(false));
}

#[test]
fn despawn_detaches_the_script_instance() {
    let (_dir, mut engine) = setup();
    let mut scene = Scene::new();
    let (entity, id) = scene.spawn_scripted("Game.Spinner");
    scene.bind_scripts(&mut engine);
    assert_eq!(engine.live_handles(), 1);

    scene.despawn(entity, &mut engine);
    assert!(engine.get_instance(id, "Game.Spinner").is_none());
    assert_eq!(engine.live_handles(), 0);
    assert!(scene.world.get::<ember_engine::scene::SceneId>(entity).is_none(), "entity is gone from the world");
}

#[test]
fn binding_is_idempotent() {
    let (_dir, mut engine) = setup();
    let mut scene = Scene::new();
    let (_entity, id) = scene.spawn_scripted("Game.Spinner");

    scene.bind_scripts(&mut engine);
    let first = engine.get_instance(id, "Game.Spinner").expect("instance").handle();
    scene.bind_scripts(&mut engine);
    let second = engine.get_instance(id, "Game.Spinner").expect("instance").handle();
    assert_eq!(first, second, "rebinding must not replace a live instance");
    assert_eq!(engine.live_handles(), 1);
}

use anyhow::Result;
use ember_engine::config::EngineConfig;
use ember_engine::scene::Scene;
use ember_engine::script_watch::ScriptSourceWatcher;
use ember_engine::scripting::ScriptEngine;

/// Headless scripting host: loads the configured assemblies, binds one
/// entity per discovered class, and runs a short edit -> play -> edit cycle.
/// Useful for exercising reload behaviour without the editor.
fn main() -> Result<()> {
    let config = EngineConfig::load_or_default("assets/config.json");
    let mut scripts = ScriptEngine::new(config.scripting.clone())?;

    println!("[host] generation {} classes:", scripts.generation());
    for name in scripts.class_names() {
        println!("[host]   {name}");
    }

    let mut watcher = None;
    if config.scripting.auto_reload {
        let mut w = ScriptSourceWatcher::new()?;
        w.watch(&config.scripting.core_assembly)?;
        w.watch(&config.scripting.client_assembly)?;
        watcher = Some(w);
    }

    let mut scene = Scene::new();
    for name in scripts.class_names() {
        scene.spawn_scripted(name);
    }
    scene.bind_scripts(&mut scripts);

    scene.on_runtime_start(&mut scripts);
    for _ in 0..8 {
        if let Some(watcher) = watcher.as_mut() {
            if watcher.drain_dirty() {
                println!("[host] sources changed, reloading domain");
                scene.on_runtime_stop(&mut scripts);
                scripts.reload_domain()?;
                scene.bind_scripts(&mut scripts);
                scene.on_runtime_start(&mut scripts);
            }
        }
        scene.update(&scripts, 1.0 / 60.0);
    }
    scene.on_runtime_stop(&mut scripts);

    println!("[host] done, {} live handles", scripts.live_handles());
    Ok(())
}

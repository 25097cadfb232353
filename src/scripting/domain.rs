use anyhow::{anyhow, Result};
use glam::Vec2;
use rhai::{Dynamic, Engine, EvalAltResult, Map, Module, Scope, AST};
use std::fs;
use std::path::{Path, PathBuf};

use super::class::MethodHandle;
use super::gc::{GcManager, ManagedHandle};

/// One compiled script module loaded by file path. Its top-level constants
/// form the assembly's type table; its functions are the method pool.
pub struct ScriptAssembly {
    path: PathBuf,
    ast: AST,
    module: Module,
}

impl ScriptAssembly {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// An isolated execution context inside the scripting runtime: one engine
/// plus the core and client assemblies loaded into it. Reload never patches
/// a domain in place; it drops the whole thing and builds a fresh one.
pub struct ScriptDomain {
    engine: Engine,
    generation: u64,
    core: Option<ScriptAssembly>,
    client: Option<ScriptAssembly>,
    combined: AST,
}

impl ScriptDomain {
    pub fn new(generation: u64) -> Self {
        let mut engine = Engine::new();
        engine.set_fast_operators(true);
        register_api(&mut engine);
        Self { engine, generation, core: None, client: None, combined: AST::empty() }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Read and compile one assembly file, then evaluate it once to obtain
    /// its type table. Re-reads from disk, so a reload picks up rebuilt
    /// sources.
    pub fn load_assembly(&self, path: impl AsRef<Path>) -> Result<ScriptAssembly> {
        let path = path.as_ref();
        let source = fs::read_to_string(path)
            .map_err(|err| anyhow!("reading assembly {}: {err}", path.display()))?;
        let ast = self
            .engine
            .compile(&source)
            .map_err(|err| anyhow!("compiling assembly {}: {err}", path.display()))?;
        let module = Module::eval_ast_as_new(Scope::new(), &ast, &self.engine)
            .map_err(|err| anyhow!("evaluating assembly {}: {err}", path.display()))?;
        Ok(ScriptAssembly { path: path.to_path_buf(), ast, module })
    }

    pub fn install_core(&mut self, assembly: ScriptAssembly) {
        self.core = Some(assembly);
        self.rebuild_combined();
    }

    pub fn install_client(&mut self, assembly: ScriptAssembly) {
        self.client = Some(assembly);
        self.rebuild_combined();
    }

    fn rebuild_combined(&mut self) {
        let mut combined = AST::empty();
        if let Some(core) = &self.core {
            combined = combined.merge(&core.ast);
        }
        if let Some(client) = &self.client {
            combined = combined.merge(&client.ast);
        }
        self.combined = combined;
    }

    /// Type table of the client assembly, as declared-name/value pairs.
    pub fn client_types(&self) -> impl Iterator<Item = (&str, &Dynamic)> {
        self.client.iter().flat_map(|assembly| assembly.module.iter_var())
    }

    fn assemblies(&self) -> impl Iterator<Item = &ScriptAssembly> {
        self.core.iter().chain(self.client.iter())
    }

    /// True if a free function with this exact name and parameter count is
    /// defined in any loaded assembly.
    pub fn find_function(&self, name: &str, arity: usize) -> bool {
        self.combined.iter_functions().any(|f| f.name == name && f.params.len() == arity)
    }

    /// Locate a class prototype by namespace and short name, core assembly
    /// first (the original resolves engine types before client types).
    pub fn find_prototype(&self, namespace: &str, name: &str) -> Option<Map> {
        self.assemblies().find_map(|assembly| {
            assembly.module.iter_var().find_map(|(_, value)| {
                let map = value.clone().try_cast::<Map>()?;
                let matches = type_meta(&map, "_namespace").as_deref() == Some(namespace)
                    && type_meta(&map, "_name").as_deref() == Some(name);
                matches.then_some(map)
            })
        })
    }

    /// Resolve a qualified type name to the declaring prototype's own
    /// namespace and short name. `None` means the type does not exist in any
    /// loaded assembly.
    pub fn resolve_type(&self, qualified: &str) -> Option<(String, String)> {
        self.assemblies().find_map(|assembly| {
            assembly.module.iter_var().find_map(|(_, value)| {
                let map = value.clone().try_cast::<Map>()?;
                let namespace = type_meta(&map, "_namespace")?;
                let name = type_meta(&map, "_name")?;
                (format!("{namespace}.{name}") == qualified).then_some((namespace, name))
            })
        })
    }

    /// Call a method on the managed object behind `handle`. A handle that no
    /// longer resolves is a quiet no-op; a managed-runtime error is logged
    /// and converted to `None` so callers never observe a script failure
    /// type.
    pub fn invoke(
        &self,
        gc: &GcManager,
        handle: ManagedHandle,
        method: &MethodHandle,
        args: Vec<Dynamic>,
    ) -> Option<Dynamic> {
        let object = gc.resolve(handle)?;
        let mut call_args = Vec::with_capacity(args.len() + 1);
        call_args.push(object.as_dynamic());
        call_args.extend(args);
        let mut scope = Scope::new();
        match self.engine.call_fn::<Dynamic>(&mut scope, &self.combined, &method.fn_name, call_args) {
            Ok(value) => Some(value),
            Err(err) => {
                if !matches!(err.as_ref(), EvalAltResult::ErrorFunctionNotFound(..)) {
                    eprintln!("[script] runtime error in {}: {err}", method.fn_name);
                }
                None
            }
        }
    }
}

pub(crate) fn type_meta(map: &Map, key: &str) -> Option<String> {
    map.get(key)?.clone().into_string().ok()
}

fn register_api(engine: &mut Engine) {
    engine.register_type_with_name::<Vec2>("Vec2");
    engine.register_fn("vec2", |x: rhai::FLOAT, y: rhai::FLOAT| Vec2::new(x as f32, y as f32));
    engine.register_get_set(
        "x",
        |v: &mut Vec2| v.x as rhai::FLOAT,
        |v: &mut Vec2, x: rhai::FLOAT| v.x = x as f32,
    );
    engine.register_get_set(
        "y",
        |v: &mut Vec2| v.y as rhai::FLOAT,
        |v: &mut Vec2, y: rhai::FLOAT| v.y = y as f32,
    );
    engine.register_fn("+", |a: Vec2, b: Vec2| a + b);
    engine.register_fn("-", |a: Vec2, b: Vec2| a - b);
    engine.register_fn("*", |a: Vec2, s: rhai::FLOAT| a * s as f32);
    engine.register_fn("to_string", |v: &mut Vec2| format!("({:.3}, {:.3})", v.x, v.y));
    engine.register_fn("log", |message: &str| println!("[script] {message}"));
}

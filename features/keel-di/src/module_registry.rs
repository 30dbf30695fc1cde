use std::{any::TypeId, collections::HashMap, sync::Arc};

use futures::future::try_join_all;

use crate::{
    component::{ClassProvider, Hook},
    dependency_graph::DependencyGraph,
    errors::{ConfigError, DiResult, InvariantError, RequireError},
    module::{Import, Module, ModuleMetadata},
    types::TypeInfo,
};

struct ParsedModule {
    class: ClassProvider,
    metadata: ModuleMetadata,
    /// Declared without any content, may be replaced by a dynamic registration
    is_noop: bool,
}

/// Every module of an application, in initialization order
pub struct ModuleRegistry {
    modules: Vec<Arc<Module>>,
    index: HashMap<TypeId, usize>,
}

impl ModuleRegistry {
    /// Scans the import tree below `root` and builds its modules
    pub fn new(root: Import) -> DiResult<Self> {
        let mut parsed = Vec::new();
        let mut parsed_index = HashMap::new();
        scan(&root, None, &mut parsed, &mut parsed_index)?;

        let mut graph = DependencyGraph::new();
        for module in &parsed {
            let id = module.class.info().type_id;
            graph.add_node(id);
            for import in module.metadata.imports.iter().filter(|import| !import.is_forward_ref()) {
                graph.add_dependency(id, import.class().info().type_id);
            }
        }

        let mut modules = Vec::with_capacity(parsed.len());
        let mut index = HashMap::with_capacity(parsed.len());
        let mut imports = Vec::with_capacity(parsed.len());
        for id in graph.get_init_order() {
            let position = parsed_index.get(&id).copied().ok_or_else(|| {
                InvariantError::new(format!("Module {id:?} was ordered but never scanned"))
            })?;
            let ParsedModule { class, metadata, .. } = &parsed[position];
            imports.push(metadata.imports.iter().map(|import| import.class().info().type_id).collect::<Vec<_>>());
            index.insert(id, modules.len());
            modules.push(Module::new(*class, metadata.clone())?);
        }

        for (module, imported) in modules.iter().zip(imports) {
            for id in imported {
                let target = index.get(&id).and_then(|&i| modules.get(i)).ok_or_else(|| {
                    InvariantError::new(format!("Import of '{}' was never built", module.name()))
                })?;
                module.add_import(target);
            }
        }

        tracing::debug!(
            "Module initialization order: {}",
            modules.iter().map(|module| module.name()).collect::<Vec<_>>().join(", ")
        );
        Ok(ModuleRegistry { modules, index })
    }

    /// Modules in initialization order
    pub fn modules(&self) -> &[Arc<Module>] {
        &self.modules
    }

    pub fn get(&self, module: TypeInfo) -> Result<&Arc<Module>, RequireError> {
        self.index
            .get(&module.type_id)
            .and_then(|&index| self.modules.get(index))
            .ok_or(RequireError::ModuleNotFound(module.short_name()))
    }

    pub fn get_of<M: 'static>(&self) -> Result<&Arc<Module>, RequireError> {
        self.get(TypeInfo::of::<M>())
    }

    /// Initializes the modules one after another, then registers routes and announces readiness
    pub async fn init(&self) -> DiResult<()> {
        for module in &self.modules {
            module.init().await?;
        }
        try_join_all(self.modules.iter().map(|module| module.register_routes())).await?;
        try_join_all(self.modules.iter().map(|module| module.call_hook(Hook::ApplicationReady))).await?;
        Ok(())
    }

    pub async fn start(&self) -> DiResult<()> {
        try_join_all(self.modules.iter().map(|module| module.start())).await?;
        Ok(())
    }

    /// Stops and destroys the modules in reverse initialization order
    ///
    /// Each phase completes for every module before the next phase begins.
    pub async fn terminate(&self) -> DiResult<()> {
        for module in self.modules.iter().rev() {
            module.call_hook(Hook::ApplicationStop).await?;
        }
        for module in self.modules.iter().rev() {
            module.stop().await?;
        }
        for module in self.modules.iter().rev() {
            module.terminate().await?;
        }
        Ok(())
    }
}

fn extract_metadata(import: &Import, imported_by: Option<&'static str>) -> DiResult<ModuleMetadata> {
    let class = import.class();
    let metadata = match import {
        Import::Dynamic(dynamic) => Some(dynamic.metadata.clone()),
        _ => class.module(),
    };
    let metadata = metadata.ok_or(ConfigError::NotAModule {
        class: class.name(),
        imported_by: imported_by.unwrap_or("Application"),
    })?;

    for nested in &metadata.imports {
        if nested.class().module().is_none() && !nested.is_dynamic() {
            return Err(ConfigError::NotAModule {
                class: nested.class().name(),
                imported_by: class.name(),
            }
            .into());
        }
    }
    Ok(metadata)
}

fn scan(
    import: &Import,
    imported_by: Option<&'static str>,
    parsed: &mut Vec<ParsedModule>,
    parsed_index: &mut HashMap<TypeId, usize>,
) -> DiResult<()> {
    let class = import.class();
    let id = class.info().type_id;

    if let Some(&position) = parsed_index.get(&id) {
        if !import.is_dynamic() {
            return Ok(());
        }
        if !parsed[position].is_noop {
            return Err(ConfigError::DuplicateDynamicModule { module: class.name() }.into());
        }
    }

    let metadata = extract_metadata(import, imported_by)?;
    let entry = ParsedModule {
        class,
        is_noop: metadata.is_empty(),
        metadata: metadata.clone(),
    };
    // A dynamic registration replaces an empty declaration in place
    match parsed_index.get(&id) {
        Some(&position) => parsed[position] = entry,
        None => {
            parsed_index.insert(id, parsed.len());
            parsed.push(entry);
        }
    }
    tracing::debug!("Scanned module '{}'", class.name());

    for nested in &metadata.imports {
        scan(nested, Some(class.name()), parsed, parsed_index)?;
    }
    Ok(())
}

use eyre::Result;
use modreg_registry::{ModuleFilter, ModuleLookup, ModuleManager, ModuleView, RequestContext};
use std::io::{self, Write};

use crate::cli::Commands;

pub async fn handle_module_command(
    cmd: Commands,
    manager: &ModuleManager,
    ctx: &RequestContext,
    dry_run: bool,
) -> Result<()> {
    match cmd {
        Commands::List {
            all,
            frontend,
            backend,
            core,
            backend_menu,
            json,
        } => {
            let filter = ModuleFilter {
                is_frontend: frontend,
                is_backend: backend,
                is_core: core,
                is_backend_menu: backend_menu,
            };
            handle_list_modules(&filter, all, json, manager, ctx).await
        }
        Commands::Show { slug, json } => handle_show_module(slug, json, manager, ctx).await,
        Commands::Install { slug } => handle_install_module(slug, manager, dry_run).await,
        Commands::Uninstall { slug, force } => {
            handle_uninstall_module(slug, force, manager, dry_run).await
        }
        Commands::Enable { slug } => handle_toggle_module(slug, true, manager, dry_run).await,
        Commands::Disable { slug } => handle_toggle_module(slug, false, manager, dry_run).await,
        Commands::Import { force } => handle_import_modules(force, manager, dry_run).await,
        Commands::Controllers { slug, controller } => {
            handle_controllers(slug, controller, manager).await
        }
        Commands::Config { .. } => Err(eyre::eyre!("config commands do not use the registry")),
    }
}

async fn handle_list_modules(
    filter: &ModuleFilter,
    include_disabled: bool,
    json: bool,
    manager: &ModuleManager,
    ctx: &RequestContext,
) -> Result<()> {
    let modules = manager.list_modules(filter, include_disabled, ctx).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&modules)?);
        return Ok(());
    }

    if modules.is_empty() {
        println!("📦 No modules match");
        if filter.is_backend && ctx.group_id.is_none() {
            println!("💡 Backend listings need a group: pass --group or set session.group_id");
        } else {
            println!("💡 Use 'modreg import' to register modules found on disk");
        }
        return Ok(());
    }

    println!("📦 Modules ({}):", modules.len());
    for module in &modules {
        println!("  {}", summary_line(module));
    }
    Ok(())
}

async fn handle_show_module(
    slug: String,
    json: bool,
    manager: &ModuleManager,
    ctx: &RequestContext,
) -> Result<()> {
    let module = match manager.get(&slug, ctx).await? {
        ModuleLookup::Found(module) => module,
        ModuleLookup::Disabled => {
            println!("⚠️ Module '{}' is disabled", slug);
            println!("💡 Use 'modreg enable {}' to switch it on", slug);
            return Ok(());
        }
        ModuleLookup::NotFound => {
            println!("❌ Module '{}' is not registered", slug);
            return Ok(());
        }
        ModuleLookup::InvalidSlug => {
            return Err(eyre::eyre!("'{}' is not a valid module slug", slug));
        }
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&module)?);
        return Ok(());
    }

    println!("📦 {} v{}", module.name, module.version);
    println!("   Slug: {}", module.slug);
    if !module.description.is_empty() {
        println!("   Description: {}", module.description);
    }
    if !module.module_type.is_empty() {
        println!("   Type: {}", module.module_type);
    }
    println!("   Core: {}", yes_no(module.is_core));
    println!("   Frontend: {}", yes_no(module.is_frontend));
    println!(
        "   Backend: {} (menu: {})",
        yes_no(module.is_backend),
        yes_no(module.is_backend_menu)
    );
    println!("   Skip XSS filtering: {}", yes_no(module.skip_xss));

    if module.controllers.is_empty() {
        println!("   Controllers: (none)");
    } else {
        println!("   Controllers:");
        for controller in module.controllers.iter() {
            if controller.methods.is_empty() {
                println!("     - {}", controller.name);
            } else {
                println!("     - {} ({})", controller.name, controller.methods.join(", "));
            }
        }
    }
    Ok(())
}

async fn handle_install_module(slug: String, manager: &ModuleManager, dry_run: bool) -> Result<()> {
    if dry_run {
        println!(
            "Would install module '{}' from {}",
            slug,
            manager.config().addon_modules_dir.join(&slug).display()
        );
        return Ok(());
    }

    println!("📦 Installing module: {}", slug);

    if manager.exists(&slug).await? {
        println!("⚠️ Module '{}' is already registered", slug);
        println!("💡 Uninstall it first to reinstall");
        return Ok(());
    }

    match manager.install(&slug).await {
        Ok(true) => println!("✅ Installed {}", slug),
        Ok(false) => {
            println!(
                "❌ No manifest found for '{}' under {}",
                slug,
                manager.config().addon_modules_dir.display()
            );
        }
        Err(e) => {
            eprintln!("❌ Failed to install {}: {}", slug, e);
            return Err(e.into());
        }
    }
    Ok(())
}

async fn handle_uninstall_module(
    slug: String,
    force: bool,
    manager: &ModuleManager,
    dry_run: bool,
) -> Result<()> {
    if dry_run {
        println!("Would uninstall module: {}", slug);
        return Ok(());
    }

    if !force && !confirm(&format!("Uninstall '{}' and run its uninstall script?", slug))? {
        println!("❌ Cancelled");
        return Ok(());
    }

    match manager.uninstall(&slug).await {
        Ok(true) => println!("✅ Uninstalled {}", slug),
        Ok(false) => {
            println!("❌ No manifest found for '{}', nothing was removed", slug);
        }
        Err(e) => {
            eprintln!("❌ Failed to uninstall {}: {}", slug, e);
            return Err(e.into());
        }
    }
    Ok(())
}

async fn handle_toggle_module(
    slug: String,
    enabled: bool,
    manager: &ModuleManager,
    dry_run: bool,
) -> Result<()> {
    let action = if enabled { "enable" } else { "disable" };

    if dry_run {
        println!("Would {} module: {}", action, slug);
        return Ok(());
    }

    let changed = if enabled {
        manager.enable(&slug).await?
    } else {
        manager.disable(&slug).await?
    };

    if changed {
        println!("✅ {}d {}", capitalize(action), slug);
    } else {
        println!("❌ Module '{}' is not registered", slug);
    }
    Ok(())
}

async fn handle_import_modules(force: bool, manager: &ModuleManager, dry_run: bool) -> Result<()> {
    let config = manager.config();

    if dry_run {
        println!(
            "Would rebuild the registry from {} and {}",
            config.core_modules_dir.display(),
            config.addon_modules_dir.display()
        );
        return Ok(());
    }

    if !force
        && !confirm("Replace every registry record with the modules found on disk?")?
    {
        println!("❌ Cancelled");
        return Ok(());
    }

    let report = manager.import_all().await?;

    println!("✅ Imported {} modules", report.imported.len());
    for slug in &report.imported {
        println!("  📦 {}", slug);
    }

    if !report.skipped.is_empty() {
        println!("⚠️ Skipped {} modules:", report.skipped.len());
        for skipped in &report.skipped {
            println!("  ❌ {} ({}): {}", skipped.slug, skipped.path.display(), skipped.reason);
        }
    }
    Ok(())
}

async fn handle_controllers(
    slug: String,
    controller: Option<String>,
    manager: &ModuleManager,
) -> Result<()> {
    match controller {
        Some(controller) => {
            let methods = manager.controller_methods(&slug, &controller).await?;
            if methods.is_empty() {
                println!("📋 {}/{} declares no methods", slug, controller);
            } else {
                println!("📋 Methods of {}/{}:", slug, controller);
                for method in methods {
                    println!("  - {}", method);
                }
            }
        }
        None => {
            let names = manager.controller_names(&slug).await?;
            if names.is_empty() {
                println!("📋 No controllers for '{}'", slug);
            } else {
                println!("📋 Controllers of {}:", slug);
                for name in names {
                    println!("  - {}", name);
                }
            }
        }
    }
    Ok(())
}

fn summary_line(module: &ModuleView) -> String {
    let mut tags = Vec::new();
    if module.is_core {
        tags.push("core");
    }
    if module.is_frontend {
        tags.push("frontend");
    }
    if module.is_backend {
        tags.push("backend");
    }
    if !module.enabled {
        tags.push("disabled");
    }

    format!(
        "📦 {} v{} - {} [{}]",
        module.name,
        module.version,
        module.slug,
        tags.join(", ")
    )
}

fn confirm(question: &str) -> Result<bool> {
    print!("{} (y/N): ", question);
    io::stdout().flush()?;
    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    Ok(input.trim().to_lowercase().starts_with('y'))
}

fn yes_no(value: bool) -> &'static str {
    if value { "yes" } else { "no" }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

//! `taor tools`: list registered tools.

use std::sync::Arc;

use taor_tools::ResultStore;

use super::setup::tool_registry;

pub fn run() -> anyhow::Result<()> {
    let registry = tool_registry(Arc::new(ResultStore::new()))?;

    println!("🔧 Registered Tools");
    println!("===================");
    println!();
    for def in registry.definitions() {
        let gated = registry
            .get(&def.name)
            .is_ok_and(|tool| tool.requires_approval());
        let marker = if gated { " (needs approval)" } else { "" };
        println!("  {}{marker}", def.name);
        println!("      {}", def.description);
    }
    println!();
    println!("  Hosts embedding taor register their own domain tools.");
    Ok(())
}

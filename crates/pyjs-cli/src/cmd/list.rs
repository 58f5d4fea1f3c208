//! `list` command

use pyjs_core::Factory;
use pyjs_core::factory::RECIPES;

/// Print every target and recipe name, one per line.
pub fn list() {
    println!("targets:");
    for target in Factory::targets() {
        println!("  {target}");
    }
    println!("recipes:");
    for recipe in RECIPES {
        println!("  {recipe}");
    }
}

/// Tracker, integrity and transaction behaviour across nested calls
pub mod mutation_tests;
/// Events, collectors and cache purges after commit
pub mod effects_tests;
/// Upload and import through FilesService
pub mod files_tests;

use models::Item;
use serde_json::Value;

pub fn item(value: Value) -> Item { models::item::item_from_json(value) }

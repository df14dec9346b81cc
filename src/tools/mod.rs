//! 工具箱：Tool trait 与注册表、执行器、内置工具（ls / read / thinking / translate）

pub mod documents;
pub mod executor;
pub mod filesystem;
pub mod registry;
pub mod schema;
pub mod thinking;
pub mod translate;

pub use documents::{DocumentEntry, DocumentSet, EntryKind};
pub use executor::ToolExecutor;
pub use filesystem::{LsTool, ReadTool};
pub use registry::{Tool, ToolContext, ToolError, ToolRegistry};
pub use thinking::ThinkingTool;
pub use translate::{TranslateTool, MAX_SOURCE_CHARS};

/// 注册全部内置工具；ls / read 限定在 docs 根目录下
pub fn builtin_registry(docs: DocumentSet) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(LsTool::new(docs.clone()));
    registry.register(ReadTool::new(docs));
    registry.register(ThinkingTool);
    registry.register(TranslateTool);
    registry
}

// ============================================================================
// 接口层：Tauri command 定义
// ✅ 只能做：参数校验、调用 services、转换错误为 String
// ⛔ 禁止：实现业务逻辑
// ============================================================================

pub mod build;
pub mod project;
pub mod window;

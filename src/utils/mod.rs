// ============================================================================
// 工具层：错误类型等跨层共享设施
// ============================================================================

pub mod error;

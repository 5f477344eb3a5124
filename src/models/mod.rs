// ============================================================================
// 数据模型层：前后端通信的 DTO 定义
// ============================================================================

pub mod dtos;

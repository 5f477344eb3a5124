// ============================================================================
// 统一错误类型定义
// 使用 thiserror 派生宏，遵循 Rust 错误处理最佳实践
// ============================================================================

use thiserror::Error;

/// 应用统一错误枚举
///
/// 覆盖所有业务场景的错误类型，每个变体对应一类错误。
/// 通过 `impl From<AppError> for String` 保持与现有 Tauri command 的兼容性
/// （Tauri command 要求返回 `Result<T, String>`）。
#[derive(Debug, Error)]
pub enum AppError {
    /// 请求数据不完整或格式错误（如项目名为空、项目记录不存在、找不到脚本入口）
    #[error("无效请求：{0}")]
    InvalidRequest(String),

    /// 路径必须是已存在的目录但实际不是
    #[error("无效目录：{0}")]
    InvalidFolder(String),

    /// 内嵌图标载荷格式错误（缺少 data: 前缀、缺少逗号分隔符、base64 非法）
    ///
    /// 非致命错误：构建编排层捕获后降级为无图标构建。
    #[error("图标解码失败：{0}")]
    IconDecode(String),

    /// 外部打包器以非零状态退出，消息原样携带其诊断输出
    #[error("打包失败：{0}")]
    PackagingFailed(String),

    /// 打包器报告成功但预期产物不存在
    #[error("产物缺失：{0}")]
    ArtifactMissing(String),

    /// 同一项目已有构建在进行中
    #[error("构建进行中：{0}")]
    BuildInProgress(String),

    /// 项目记录读写失败（JSON 序列化/反序列化）
    #[error("项目记录错误：{0}")]
    Registry(String),

    /// 文件系统 IO 错误
    #[error("IO 错误：{0}")]
    Io(#[from] std::io::Error),

    /// 用户取消操作（如关闭文件选择对话框）
    #[error("cancelled")]
    Cancelled,

    /// 系统文件管理器打开失败
    #[error("打开文件夹失败：{0}")]
    OpenFolderError(String),
}

/// 便捷类型别名，统一项目内的 Result 签名
pub type AppResult<T> = Result<T, AppError>;

/// 将 AppError 转换为 String，保持与 Tauri command 返回类型的兼容性
///
/// Tauri 的 `#[tauri::command]` 要求错误类型为 `String`，
/// 此转换确保所有错误都能正确传递到前端。
impl From<AppError> for String {
    fn from(err: AppError) -> Self {
        err.to_string()
    }
}

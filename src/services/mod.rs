// ============================================================================
// 业务层：纯 Rust 核心逻辑
// ✅ 特点：尽量不依赖 `tauri::*`，保持纯净，方便写 #[test]
// ⛔ 禁止：直接返回前端专用的错误格式
// ============================================================================

pub mod analyzer;
pub mod icon;
pub mod packager;
pub mod scanner;

// ============================================================================
// 常量定义
// ============================================================================

/// 忽略目录列表：分析、扫描与暂存复制在任意深度都不进入的目录名
/// 覆盖依赖缓存、版本控制元数据、构建产物、编辑器配置与字节码缓存
pub const IGNORED_DIRS: &[&str] = &[
    "node_modules",
    ".git",
    "dist",
    "build",
    ".vscode",
    "__pycache__",
];

/// 判断遍历条目是否为忽略目录（配合 `WalkDir::filter_entry` 做剪枝）
pub fn is_ignored_dir(entry: &walkdir::DirEntry) -> bool {
    entry.file_type().is_dir()
        && entry
            .file_name()
            .to_str()
            .map(|name| IGNORED_DIRS.contains(&name))
            .unwrap_or(false)
}

// ============================================================================
// 存储布局
// ============================================================================

/// 应用存储布局，启动时解析一次并注册为 Tauri 托管状态
pub struct StoragePaths {
    /// 项目注册表根目录（文档目录下的 Web2EXE）
    pub registry_root: std::path::PathBuf,
    /// 脚本构建工作区根目录（文档目录下的 Web2EXE_ScriptBuilds）
    pub script_builds_root: std::path::PathBuf,
    /// 项目资源暂存根目录（下载目录）
    pub staging_root: std::path::PathBuf,
    /// 构建产物输出目录（下载目录）
    pub output_dir: std::path::PathBuf,
}

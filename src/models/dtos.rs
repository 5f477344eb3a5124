// ============================================================================
// 数据传输对象（DTO）定义
// 前后端通信的数据结构，仅包含字段定义和序列化派生
// ⛔ 禁止：包含复杂的业务逻辑方法
// ============================================================================

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// 技术栈分析报告，由 `analyze_project` command 返回
/// 也作为 `FolderScan` 与项目记录的嵌入字段持久化
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisReport {
    /// 检测到的框架列表（按检出顺序，无重复）
    pub frameworks: Vec<String>,
    /// 检测到的辅助技术列表（与 frameworks 互斥，同一名称只出现在一个集合中）
    pub technologies: Vec<String>,
    /// 技术名称 → 清单中声明的版本号（非字符串版本记为 "unknown"）
    pub dependency_versions: BTreeMap<String, String>,
    /// 项目类型分类标签（如 "React SPA"、"Vanilla JavaScript"）
    pub project_type: String,
}

/// 分析过程中跳过的单个文件记录
/// 跳过不是错误：不可读文件、损坏的清单都以此形式留痕，可供查询与断言
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SkipEvent {
    /// 被跳过文件相对项目根目录的路径（正斜杠分隔）
    pub path: String,
    /// 跳过原因（人类可读）
    pub reason: String,
}

/// 各类文件的数量统计（不受预览条数上限影响）
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ScanTotals {
    /// HTML 文件总数
    pub html_count: usize,
    /// 样式文件总数（.css/.scss/.sass）
    pub css_count: usize,
    /// 脚本文件总数（.js）
    pub js_count: usize,
    /// 资源文件总数（图片/图标）
    pub asset_count: usize,
    /// 扫描到的文件总数（忽略目录之外的全部文件）
    pub total_files: usize,
}

/// 目录扫描结果，由 `scan_folder` command 返回
/// 驱动前端导入流程：入口文件、分类文件清单、统计与内嵌分析报告
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FolderScan {
    /// 被扫描目录的绝对路径
    pub folder_path: String,
    /// 目录名（路径最后一段）
    pub folder_name: String,
    /// 入口文件：优先 index.html，否则第一个 HTML 文件，可能不存在
    pub entry_file: Option<String>,
    /// HTML 文件相对路径列表（已排序）
    pub html_files: Vec<String>,
    /// 样式文件相对路径列表（已排序）
    pub css_files: Vec<String>,
    /// 脚本文件相对路径列表（已排序）
    pub js_files: Vec<String>,
    /// 资源文件相对路径预览（最多 10 条，总数见 totals）
    pub asset_files: Vec<String>,
    /// 各类文件数量统计
    pub totals: ScanTotals,
    /// 技术栈分析报告
    pub analysis: AnalysisReport,
}

/// 构建选项，随构建请求从前端传入
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BuildOptions {
    /// true 生成单文件可执行程序，false 生成目录模式
    pub single_file: bool,
    /// true 隐藏控制台窗口
    pub hide_console: bool,
    /// true 启用字节码优化（-O2）
    pub optimize: bool,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            single_file: true,
            hide_console: true,
            optimize: false,
        }
    }
}

/// Web 项目构建请求，`build_project` command 的入参集合
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct WebBuildRequest {
    /// 项目记录标识（目录安全字符串）
    pub project_id: String,
    /// 项目显示名称，决定可执行文件名（空格替换为下划线）
    pub project_name: String,
    /// 可选的图标载荷（data URI 字符串）
    pub icon_data: Option<String>,
    /// 构建选项，缺省时使用默认值
    #[serde(default)]
    pub options: BuildOptions,
}

/// 脚本项目转换请求，`convert_script_project` command 的入参集合
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ScriptBuildRequest {
    /// 脚本项目根目录的绝对路径
    pub project_path: String,
    /// 目标可执行文件名
    pub exe_name: String,
    /// 可选的图标载荷（data URI 字符串）
    pub icon_data: Option<String>,
    /// 构建选项，缺省时使用默认值
    #[serde(default)]
    pub options: BuildOptions,
}

/// 构建成功结果，由 `build_project` / `convert_script_project` command 返回
/// 失败不走此结构：以分类错误字符串经 Promise reject 返回前端
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct BuildResult {
    /// 实际使用的可执行文件名
    pub exe_name: String,
    /// 产物的绝对路径
    pub exe_path: String,
    /// 产物字节大小
    pub size_bytes: u64,
    /// 图标处理结果标签：native / converted / raw-fallback / skipped
    pub icon_mode: String,
}

/// 项目创建结果，由 `create_project` command 返回
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct CreatedProject {
    /// 派生出的项目标识
    pub id: String,
    /// 资源暂存目录（下载目录下，以净化后的项目标识命名）
    pub staging_folder: String,
    /// 项目记录目录（文档目录下的注册表内）
    pub metadata_folder: String,
}

// ============================================================================
// 项目相关 Commands
// 负责：目录选择、目录扫描、技术栈分析、项目创建与清单查询
// ============================================================================

use std::path::{Path, PathBuf};

use crate::models::dtos::{AnalysisReport, CreatedProject, FolderScan};
use crate::registry::{self, ProjectRecord, ProjectRegistry};
use crate::services::packager::copy_dir_excluding;
use crate::services::{analyzer, scanner, StoragePaths, IGNORED_DIRS};
use crate::utils::error::AppError;

/// 选择项目目录：弹出原生文件夹选择对话框
///
/// 调用系统原生文件夹选择对话框，返回所选目录的绝对路径。
/// 用户取消时以 "cancelled" 拒绝，前端据此静默收起流程。
#[tauri::command]
pub async fn browse_folder(app: tauri::AppHandle) -> Result<String, String> {
    use tauri_plugin_dialog::DialogExt;

    // 调用原生文件夹选择对话框（阻塞等待用户选择）
    let folder = app.dialog().file().blocking_pick_folder();

    let folder_path = match folder {
        Some(f) => f,
        None => return Err(AppError::Cancelled.into()),
    };

    let path = folder_path
        .as_path()
        .ok_or_else(|| "无法解析所选文件夹路径".to_string())?;

    Ok(path.to_string_lossy().to_string())
}

/// 扫描目录内容：分类文件清单、入口文件与内嵌技术栈分析
#[tauri::command]
pub async fn scan_folder(folder_path: String) -> Result<FolderScan, String> {
    let scan = scanner::scan_folder(Path::new(&folder_path))?;
    Ok(scan)
}

/// 分析目录技术栈：框架、辅助技术、依赖版本与项目类型分类
///
/// 不可读文件与损坏清单不会使分析失败，以警告日志留痕后跳过。
#[tauri::command]
pub async fn analyze_project(folder_path: String) -> Result<AnalysisReport, String> {
    let analysis = analyzer::analyze_project(Path::new(&folder_path))?;
    for skip in &analysis.skipped {
        log::warn!("分析跳过 {}：{}", skip.path, skip.reason);
    }
    Ok(analysis.report)
}

/// 创建项目：派生标识、分析技术栈、暂存资源副本并落盘项目记录
///
/// # 参数
/// - `name`: 项目显示名称（决定记录标识与暂存目录名）
/// - `author` / `version` / `description`: 记录元数据
/// - `folder_path`: 用户选择的源目录
#[tauri::command]
pub async fn create_project(
    name: String,
    author: String,
    version: String,
    description: String,
    folder_path: String,
    storage: tauri::State<'_, StoragePaths>,
) -> Result<CreatedProject, String> {
    // 1. 验证入参
    if name.trim().is_empty() {
        return Err(AppError::InvalidRequest("项目名称不能为空".to_string()).into());
    }
    let source = PathBuf::from(&folder_path);
    if !source.is_dir() {
        return Err(AppError::InvalidFolder(format!("源目录不存在：{}", folder_path)).into());
    }

    // 2. 派生标识并分析技术栈
    let id = registry::sanitize_project_id(&name)?;
    let analysis = analyzer::analyze_project(&source)?;
    for skip in &analysis.skipped {
        log::warn!("分析跳过 {}：{}", skip.path, skip.reason);
    }

    // 3. 暂存资源副本（下载目录下以标识命名，忽略目录不复制）
    let staging = storage.staging_root.join(&id);
    copy_dir_excluding(&source, &staging, IGNORED_DIRS)?;

    // 4. 落盘项目记录
    let reg = ProjectRegistry::open(&storage.registry_root)?;
    let record = ProjectRecord {
        id: id.clone(),
        name: name.trim().to_string(),
        author,
        version,
        description,
        source_folder: source.display().to_string(),
        staging_folder: staging.display().to_string(),
        created_at: registry::now_timestamp(),
        analysis: analysis.report,
    };
    reg.save(&record)?;

    log::info!("项目已创建：{}（{}）", record.name, record.id);
    Ok(CreatedProject {
        id: record.id.clone(),
        staging_folder: record.staging_folder.clone(),
        metadata_folder: reg.project_dir(&record.id).display().to_string(),
    })
}

/// 列出全部项目记录（按标识排序，损坏条目跳过）
#[tauri::command]
pub async fn list_projects(
    storage: tauri::State<'_, StoragePaths>,
) -> Result<Vec<ProjectRecord>, String> {
    let reg = ProjectRegistry::open(&storage.registry_root)?;
    let records = reg.list()?;
    Ok(records)
}

// ============================================================================
// 构建相关 Commands
// 负责：Web 项目构建、脚本项目转换、在文件管理器中定位产物
// ============================================================================

use crate::models::dtos::{BuildResult, ScriptBuildRequest, WebBuildRequest};
use crate::registry::ProjectRegistry;
use crate::services::packager::{self, BuildLock, PyInstaller};
use crate::services::StoragePaths;
use crate::utils::error::AppError;

/// 构建 Web 项目：暂存资源、处理图标、调用 PyInstaller 并校验产物
///
/// 同一项目同时只允许一次构建，重复请求以 BuildInProgress 拒绝。
#[tauri::command]
pub async fn build_project(
    request: WebBuildRequest,
    storage: tauri::State<'_, StoragePaths>,
    lock: tauri::State<'_, BuildLock>,
) -> Result<BuildResult, String> {
    let registry = ProjectRegistry::open(&storage.registry_root)?;
    let result = packager::build_web_project(
        &registry,
        lock.inner(),
        &PyInstaller,
        &storage.output_dir,
        &request,
    )?;
    Ok(result)
}

/// 转换脚本项目：将本地 Python 项目直接打包为可执行程序
#[tauri::command]
pub async fn convert_script_project(
    request: ScriptBuildRequest,
    storage: tauri::State<'_, StoragePaths>,
    lock: tauri::State<'_, BuildLock>,
) -> Result<BuildResult, String> {
    let result = packager::convert_script_project(
        lock.inner(),
        &PyInstaller,
        &storage.script_builds_root,
        &storage.output_dir,
        &request,
    )?;
    Ok(result)
}

/// 定位产物：在系统文件管理器中打开产物所在位置（并选中该文件）
#[tauri::command]
pub async fn reveal_artifact(path: String) -> Result<(), String> {
    #[cfg(target_os = "windows")]
    {
        std::process::Command::new("explorer.exe")
            .arg("/select,")
            .arg(&path)
            .spawn()
            .map_err(|e| AppError::OpenFolderError(format!("无法启动资源管理器：{}", e)))?;
    }

    #[cfg(target_os = "macos")]
    {
        std::process::Command::new("open")
            .arg("-R")
            .arg(&path)
            .spawn()
            .map_err(|e| AppError::OpenFolderError(format!("无法启动 Finder：{}", e)))?;
    }

    #[cfg(target_os = "linux")]
    {
        let file_path = std::path::Path::new(&path);
        let parent_dir = file_path
            .parent()
            .ok_or_else(|| AppError::OpenFolderError("无法获取产物所在目录".to_string()))?;
        std::process::Command::new("xdg-open")
            .arg(parent_dir)
            .spawn()
            .map_err(|e| AppError::OpenFolderError(format!("无法启动文件管理器：{}", e)))?;
    }

    #[cfg(not(any(target_os = "windows", target_os = "macos", target_os = "linux")))]
    {
        return Err(AppError::OpenFolderError("不支持当前操作系统".to_string()).into());
    }

    Ok(())
}

// ============================================================================
// 目录扫描服务：导入流程的一次性文件清点
// 纯 Rust 函数，不依赖 tauri::*，方便单元测试
// ============================================================================

use crate::models::dtos::{FolderScan, ScanTotals};
use crate::services::{analyzer, is_ignored_dir};
use crate::utils::error::{AppError, AppResult};
use std::path::Path;
use walkdir::WalkDir;

/// 资源文件扩展名（图片与图标）
const ASSET_EXTS: &[&str] = &["png", "jpg", "jpeg", "gif", "svg", "webp", "ico"];

/// 资源文件预览条数上限（totals 中的计数不受影响）
const ASSET_PREVIEW_LIMIT: usize = 10;

/// 扫描目录并生成导入清单
///
/// 分类收集 HTML/样式/脚本/资源文件的相对路径（正斜杠分隔，已排序），
/// 选出入口文件，统计总量，并内嵌一份完整的技术栈分析报告。
///
/// # 参数
/// - `folder`: 待扫描目录
///
/// # 返回
/// - `Ok(FolderScan)`: 扫描结果
/// - `Err(AppError::InvalidFolder)`: 路径不存在或不是目录
pub fn scan_folder(folder: &Path) -> AppResult<FolderScan> {
    if !folder.is_dir() {
        return Err(AppError::InvalidFolder(format!(
            "扫描目录不存在：{}",
            folder.display()
        )));
    }

    let mut html_files: Vec<String> = Vec::new();
    let mut css_files: Vec<String> = Vec::new();
    let mut js_files: Vec<String> = Vec::new();
    let mut asset_files: Vec<String> = Vec::new();
    let mut total_files: usize = 0;

    for entry in WalkDir::new(folder)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !is_ignored_dir(e))
    {
        let entry = match entry {
            Ok(e) => e,
            Err(_) => continue,
        };
        if !entry.file_type().is_file() {
            continue;
        }
        total_files += 1;

        let relative = entry
            .path()
            .strip_prefix(folder)
            .unwrap_or(entry.path())
            .to_string_lossy()
            .replace('\\', "/");

        let ext = entry
            .path()
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("");

        match ext {
            "html" => html_files.push(relative),
            "css" | "scss" | "sass" => css_files.push(relative),
            "js" => js_files.push(relative),
            _ if ASSET_EXTS.contains(&ext) => asset_files.push(relative),
            _ => {}
        }
    }

    html_files.sort();
    css_files.sort();
    js_files.sort();
    asset_files.sort();

    // 入口文件：根目录 index.html > 任意 index.html > 第一个 HTML 文件
    let entry_file = html_files
        .iter()
        .find(|p| p.as_str() == "index.html")
        .or_else(|| html_files.iter().find(|p| p.ends_with("/index.html")))
        .or_else(|| html_files.first())
        .cloned();

    let totals = ScanTotals {
        html_count: html_files.len(),
        css_count: css_files.len(),
        js_count: js_files.len(),
        asset_count: asset_files.len(),
        total_files,
    };

    // 预览截断在计数之后，totals 始终反映全量
    asset_files.truncate(ASSET_PREVIEW_LIMIT);

    let analysis = analyzer::analyze_project(folder)?;
    for skip in &analysis.skipped {
        log::warn!("扫描分析跳过 {}：{}", skip.path, skip.reason);
    }
    let analysis = analysis.report;

    let folder_name = folder
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();

    Ok(FolderScan {
        folder_path: folder.to_string_lossy().to_string(),
        folder_name,
        entry_file,
        html_files,
        css_files,
        js_files,
        asset_files,
        totals,
        analysis,
    })
}

// ============================================================================
// 单元测试
// ============================================================================

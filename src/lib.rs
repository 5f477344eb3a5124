// ============================================================================
// [总线] 程序的组装车间
// ✅ 只能做：pub mod 暴露子模块、注册 .invoke_handler()、初始化 State
// ⛔ 禁止：直接实现 command 函数
// ============================================================================

pub mod commands;
pub mod models;
pub mod registry;
pub mod services;
pub mod utils;

use tauri::Manager;

use crate::services::packager::BuildLock;
use crate::services::StoragePaths;

// ============================================================================
// 应用入口
// ============================================================================

#[cfg_attr(mobile, tauri::mobile_entry_point)]
pub fn run() {
    tauri::Builder::default()
        .plugin(tauri_plugin_opener::init())
        .plugin(tauri_plugin_dialog::init())
        .setup(|app| {
            // 解析存储布局：项目记录在文档目录，暂存与产物在下载目录
            let documents = app
                .path()
                .document_dir()
                .map_err(|e| format!("获取文档目录失败：{}", e))?;
            let downloads = app
                .path()
                .download_dir()
                .map_err(|e| format!("获取下载目录失败：{}", e))?;

            app.manage(StoragePaths {
                registry_root: documents.join("Web2EXE"),
                script_builds_root: documents.join("Web2EXE_ScriptBuilds"),
                staging_root: downloads.clone(),
                output_dir: downloads,
            });
            // 构建互斥锁：同一项目同时只允许一次构建
            app.manage(BuildLock::default());
            Ok(())
        })
        .invoke_handler(tauri::generate_handler![
            // 项目 commands
            commands::project::browse_folder,
            commands::project::scan_folder,
            commands::project::analyze_project,
            commands::project::create_project,
            commands::project::list_projects,
            // 构建 commands
            commands::build::build_project,
            commands::build::convert_script_project,
            commands::build::reveal_artifact,
            // 窗口 commands
            commands::window::minimize_window,
            commands::window::toggle_maximize_window,
            commands::window::close_window,
        ])
        .run(tauri::generate_context!())
        .expect("error while running tauri application");
}

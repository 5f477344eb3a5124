// ============================================================================
// 窗口控制 Commands
// 负责：无边框窗口的最小化、最大化切换与关闭
// 操作只作用于发起调用的窗口句柄，不做全局窗口查找
// ============================================================================

/// 最小化当前窗口
#[tauri::command]
pub async fn minimize_window(window: tauri::WebviewWindow) -> Result<(), String> {
    window
        .minimize()
        .map_err(|e| format!("最小化窗口失败：{}", e))
}

/// 在最大化与还原之间切换
#[tauri::command]
pub async fn toggle_maximize_window(window: tauri::WebviewWindow) -> Result<(), String> {
    let maximized = window
        .is_maximized()
        .map_err(|e| format!("查询窗口状态失败：{}", e))?;

    if maximized {
        window
            .unmaximize()
            .map_err(|e| format!("还原窗口失败：{}", e))
    } else {
        window
            .maximize()
            .map_err(|e| format!("最大化窗口失败：{}", e))
    }
}

/// 关闭当前窗口
#[tauri::command]
pub async fn close_window(window: tauri::WebviewWindow) -> Result<(), String> {
    window.close().map_err(|e| format!("关闭窗口失败：{}", e))
}

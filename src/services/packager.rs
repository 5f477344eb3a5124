// ============================================================================
// 打包编排服务：验证、暂存、图标、调用 PyInstaller、校验产物
// 外部打包器通过 Packager trait 注入，单元测试使用记录式假实现
// ============================================================================

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use walkdir::WalkDir;

use crate::models::dtos::{BuildOptions, BuildResult, ScriptBuildRequest, WebBuildRequest};
use crate::registry::ProjectRegistry;
use crate::services::icon::{self, IconOutcome};
use crate::services::{is_ignored_dir, IGNORED_DIRS};
use crate::utils::error::{AppError, AppResult};

/// 外部打包器的可执行程序名
pub const PYINSTALLER_PROGRAM: &str = "pyinstaller";

/// Web 构建必须随附的隐藏导入（pywebview 运行时模块）
const WEB_HIDDEN_IMPORTS: &[&str] = &["webview", "webview.js"];

// ============================================================================
// 打包器接口
// ============================================================================

/// 一次打包器调用的完整描述
#[derive(Clone, Debug)]
pub struct PackagerInvocation {
    /// 可执行程序名或路径
    pub program: String,
    /// 命令行参数（顺序即传入顺序）
    pub args: Vec<String>,
    /// 调用时的工作目录
    pub cwd: PathBuf,
}

/// 打包器进程的执行结果
#[derive(Clone, Debug)]
pub struct PackagerOutput {
    /// 进程是否以成功状态退出
    pub success: bool,
    /// 退出码（被信号终止时不存在）
    pub status_code: Option<i32>,
    /// 标准输出全文
    pub stdout: String,
    /// 标准错误全文
    pub stderr: String,
}

/// 外部打包器抽象，编排流程只依赖此 trait
pub trait Packager {
    /// 同步执行一次打包器调用，返回捕获的输出
    fn run(&self, invocation: &PackagerInvocation) -> AppResult<PackagerOutput>;
}

/// PyInstaller 实现：以子进程方式调用并捕获全部输出
pub struct PyInstaller;

impl Packager for PyInstaller {
    fn run(&self, invocation: &PackagerInvocation) -> AppResult<PackagerOutput> {
        log::info!(
            "调用打包器：{} {}",
            invocation.program,
            invocation.args.join(" ")
        );

        let output = std::process::Command::new(&invocation.program)
            .args(&invocation.args)
            .current_dir(&invocation.cwd)
            .output()
            .map_err(|e| {
                AppError::PackagingFailed(format!("无法启动 {}：{}", invocation.program, e))
            })?;

        Ok(PackagerOutput {
            success: output.status.success(),
            status_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }
}

// ============================================================================
// 构建互斥锁
// ============================================================================

/// 以项目为粒度的构建互斥：同一项目同时只允许一次构建
#[derive(Default)]
pub struct BuildLock {
    running: Mutex<HashSet<String>>,
}

impl BuildLock {
    /// 尝试登记一次构建，项目已在构建中时拒绝
    pub fn try_begin(&self, key: &str) -> AppResult<()> {
        let mut running = self
            .running
            .lock()
            .map_err(|e| AppError::PackagingFailed(format!("获取构建锁失败：{}", e)))?;

        if !running.insert(key.to_string()) {
            return Err(AppError::BuildInProgress(key.to_string()));
        }
        Ok(())
    }

    /// 注销一次构建登记
    pub fn finish(&self, key: &str) {
        if let Ok(mut running) = self.running.lock() {
            running.remove(key);
        }
    }
}

// ============================================================================
// 参数组装
// ============================================================================

/// 一次打包的全部输入，参数组装的唯一来源
#[derive(Clone, Debug)]
pub struct BuildPlan {
    /// 可执行文件名（已消毒，无空格）
    pub exe_name: String,
    /// 入口脚本的绝对路径
    pub entry_script: PathBuf,
    /// 产物输出目录（--distpath）
    pub output_dir: PathBuf,
    /// 打包器中间产物目录（--workpath）
    pub work_dir: PathBuf,
    /// spec 文件生成目录（--specpath）
    pub spec_dir: PathBuf,
    /// 图标文件路径，图标被跳过时不存在
    pub icon_path: Option<PathBuf>,
    /// 用户选择的构建选项
    pub options: BuildOptions,
    /// 随附的隐藏导入模块名
    pub hidden_imports: Vec<String>,
}

/// 由构建计划组装 PyInstaller 参数列表
///
/// 参数顺序固定：打包模式在首位，入口脚本在末位，便于日志比对。
pub fn assemble_packager_args(plan: &BuildPlan) -> Vec<String> {
    let mut args: Vec<String> = Vec::new();

    if plan.options.single_file {
        args.push("--onefile".to_string());
    } else {
        args.push("--onedir".to_string());
    }
    if plan.options.hide_console {
        args.push("--windowed".to_string());
    }
    if plan.options.optimize {
        args.push("--optimize".to_string());
        args.push("2".to_string());
    }
    args.push("--noupx".to_string());
    args.push("-y".to_string());
    args.push(format!("--name={}", plan.exe_name));
    args.push(format!("--distpath={}", plan.output_dir.display()));
    args.push(format!("--workpath={}", plan.work_dir.display()));
    args.push(format!("--specpath={}", plan.spec_dir.display()));
    for import in &plan.hidden_imports {
        args.push(format!("--hidden-import={}", import));
    }
    if let Some(icon) = &plan.icon_path {
        args.push(format!("--icon={}", icon.display()));
    }
    args.push(plan.entry_script.display().to_string());

    args
}

/// 预测打包产物的落盘路径
///
/// 单文件模式产物直接位于输出目录，目录模式嵌套在同名子目录内。
pub fn predicted_artifact_path(output_dir: &Path, exe_name: &str, single_file: bool) -> PathBuf {
    let file_name = if cfg!(windows) {
        format!("{}.exe", exe_name)
    } else {
        exe_name.to_string()
    };

    if single_file {
        output_dir.join(file_name)
    } else {
        output_dir.join(exe_name).join(file_name)
    }
}

/// 由显示名称派生可执行文件名：去首尾空白并将空格替换为下划线
pub fn sanitize_exe_name(name: &str) -> String {
    name.trim().replace(' ', "_")
}

// ============================================================================
// 暂存辅助
// ============================================================================

/// 复制目录树到目标路径，按名称排除指定目录（同名文件覆盖）
pub fn copy_dir_excluding(src: &Path, dst: &Path, exclude_dirs: &[&str]) -> AppResult<()> {
    std::fs::create_dir_all(dst)?;

    for entry in WalkDir::new(src).into_iter().filter_entry(|e| {
        if e.file_type().is_dir() {
            if let Some(name) = e.file_name().to_str() {
                return !exclude_dirs.contains(&name);
            }
        }
        true
    }) {
        let entry =
            entry.map_err(|e| AppError::InvalidFolder(format!("遍历目录失败：{}", e)))?;

        let relative = entry
            .path()
            .strip_prefix(src)
            .map_err(|e| AppError::InvalidFolder(format!("路径处理失败：{}", e)))?;

        // 跳过根目录本身
        if relative.as_os_str().is_empty() {
            continue;
        }

        let target = dst.join(relative);
        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&target)?;
        } else {
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::copy(entry.path(), &target)?;
        }
    }

    Ok(())
}

/// 生成 pywebview 启动脚本（内容确定，同一输入产出完全相同的文本）
///
/// 资源目录以绝对路径内嵌：单文件产物运行在临时解包目录中，
/// 不能相对 `__file__` 定位页面。
pub fn render_launcher_script(window_title: &str, app_dir: &Path, entry_page: &str) -> String {
    let title = window_title.replace('"', "\\\"");
    let entry = entry_page.replace('"', "\\\"");

    format!(
        r#"import os

import webview

APP_DIR = r"{app_dir}"


def main():
    index = os.path.join(APP_DIR, *"{entry}".split("/"))
    webview.create_window(
        title="{title}",
        url=f"file://{{index}}",
        width=1024,
        height=768,
        resizable=True,
        background_color="#ffffff",
    )
    webview.start(debug=False, http_server=False)


if __name__ == "__main__":
    main()
"#,
        app_dir = app_dir.display(),
        entry = entry,
        title = title,
    )
}

/// 在暂存的资源目录中定位入口页面
///
/// 与目录扫描相同的优先级：根目录 index.html > 任意 index.html > 第一个 HTML。
fn find_entry_page(app_dir: &Path) -> AppResult<String> {
    let mut pages: Vec<String> = Vec::new();

    for entry in WalkDir::new(app_dir)
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
        let is_html = entry
            .path()
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.eq_ignore_ascii_case("html"))
            .unwrap_or(false);
        if !is_html {
            continue;
        }
        if let Ok(relative) = entry.path().strip_prefix(app_dir) {
            pages.push(relative.to_string_lossy().replace('\\', "/"));
        }
    }

    if pages.iter().any(|p| p == "index.html") {
        return Ok("index.html".to_string());
    }
    if let Some(nested) = pages.iter().find(|p| p.ends_with("/index.html")) {
        return Ok(nested.clone());
    }
    match pages.into_iter().next() {
        Some(first) => Ok(first),
        None => Err(AppError::InvalidFolder(
            "暂存目录中未找到 HTML 入口页面".to_string(),
        )),
    }
}

/// 在脚本项目根目录定位入口脚本
///
/// 优先级：main.py > app.py > run.py > 按文件名排序的第一个 .py 文件。
fn find_script_entry(project_dir: &Path) -> AppResult<PathBuf> {
    let mut scripts: Vec<String> = Vec::new();

    for entry in std::fs::read_dir(project_dir)?.flatten() {
        let path = entry.path();
        let is_python = path.is_file()
            && path
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| e.eq_ignore_ascii_case("py"))
                .unwrap_or(false);
        if is_python {
            scripts.push(entry.file_name().to_string_lossy().to_string());
        }
    }
    scripts.sort();

    for preferred in ["main.py", "app.py", "run.py"] {
        if scripts.iter().any(|s| s == preferred) {
            return Ok(project_dir.join(preferred));
        }
    }
    match scripts.first() {
        Some(first) => Ok(project_dir.join(first)),
        None => Err(AppError::InvalidRequest(
            "项目中未找到 Python 脚本入口".to_string(),
        )),
    }
}

/// 处理可选的图标载荷，解码失败降级为跳过而不是中断构建
fn resolve_icon(icon_data: Option<&str>, work_dir: &Path) -> AppResult<IconOutcome> {
    let Some(data_uri) = icon_data else {
        return Ok(IconOutcome::Skipped);
    };

    match icon::prepare_icon(data_uri, work_dir, "app_icon") {
        Ok(outcome) => Ok(outcome),
        Err(AppError::IconDecode(reason)) => {
            log::warn!("图标不可用，本次构建不带图标：{}", reason);
            Ok(IconOutcome::Skipped)
        }
        Err(e) => Err(e),
    }
}

/// 校验打包器输出与预期产物，成功时返回构建结果
fn verify_artifact(
    output: &PackagerOutput,
    artifact: &Path,
    exe_name: &str,
    icon_mode: &str,
) -> AppResult<BuildResult> {
    if !output.success {
        let detail = if output.stderr.trim().is_empty() {
            output.stdout.trim().to_string()
        } else {
            output.stderr.trim().to_string()
        };
        return Err(AppError::PackagingFailed(format!(
            "打包器退出码 {:?}：{}",
            output.status_code, detail
        )));
    }

    if !artifact.is_file() {
        return Err(AppError::ArtifactMissing(artifact.display().to_string()));
    }
    let size_bytes = std::fs::metadata(artifact)?.len();

    Ok(BuildResult {
        exe_name: exe_name.to_string(),
        exe_path: artifact.display().to_string(),
        size_bytes,
        icon_mode: icon_mode.to_string(),
    })
}

// ============================================================================
// Web 项目构建流程
// ============================================================================

/// 将已创建的 Web 项目打包为桌面可执行程序
///
/// # 参数
/// - `registry`: 项目注册表（记录与构建目录来源）
/// - `lock`: 构建互斥锁
/// - `packager`: 外部打包器实现
/// - `output_dir`: 最终产物输出目录
/// - `request`: 前端传入的构建请求
///
/// # 返回
/// - `Ok(BuildResult)`: 产物路径、大小与图标处理标签
/// - `Err(AppError)`: 分类的失败原因，验证失败时不触发任何打包器调用
pub fn build_web_project(
    registry: &ProjectRegistry,
    lock: &BuildLock,
    packager: &dyn Packager,
    output_dir: &Path,
    request: &WebBuildRequest,
) -> AppResult<BuildResult> {
    // 1. 验证请求与项目记录
    if request.project_id.trim().is_empty() {
        return Err(AppError::InvalidRequest("项目标识不能为空".to_string()));
    }
    if request.project_name.trim().is_empty() {
        return Err(AppError::InvalidRequest("项目名称不能为空".to_string()));
    }

    let record = registry.load(&request.project_id)?;
    let staging = PathBuf::from(&record.staging_folder);
    if !staging.is_dir() {
        return Err(AppError::InvalidFolder(format!(
            "项目暂存目录不存在：{}",
            staging.display()
        )));
    }

    // 2. 登记构建，结束时无论成败都注销
    lock.try_begin(&request.project_id)?;
    let lock_key = request.project_id.clone();
    let _lock_guard = scopeguard::guard((), |_| lock.finish(&lock_key));

    log::info!("开始构建 Web 项目：{}", request.project_id);

    // 3. 暂存：清空构建目录，复制资源，生成启动脚本
    let build_dir = registry.build_dir(&request.project_id);
    if build_dir.exists() {
        std::fs::remove_dir_all(&build_dir)?;
    }
    let app_dir = build_dir.join("app");
    copy_dir_excluding(&staging, &app_dir, IGNORED_DIRS)?;

    let entry_page = find_entry_page(&app_dir)?;
    let launcher_path = build_dir.join("main.py");
    std::fs::write(
        &launcher_path,
        render_launcher_script(&request.project_name, &app_dir, &entry_page),
    )?;
    let work_dir = build_dir.join("build");
    std::fs::create_dir_all(&work_dir)?;

    // 4. 图标：解码失败降级为无图标构建
    let icon_outcome = resolve_icon(request.icon_data.as_deref(), &build_dir)?;

    // 5. 组装并调用打包器
    let exe_name = sanitize_exe_name(&request.project_name);
    let plan = BuildPlan {
        exe_name: exe_name.clone(),
        entry_script: launcher_path,
        output_dir: output_dir.to_path_buf(),
        work_dir,
        spec_dir: build_dir.clone(),
        icon_path: icon_outcome.icon_path().map(Path::to_path_buf),
        options: request.options.clone(),
        hidden_imports: WEB_HIDDEN_IMPORTS.iter().map(|s| s.to_string()).collect(),
    };
    let invocation = PackagerInvocation {
        program: PYINSTALLER_PROGRAM.to_string(),
        args: assemble_packager_args(&plan),
        cwd: build_dir.clone(),
    };

    let artifact = predicted_artifact_path(output_dir, &exe_name, plan.options.single_file);
    // 清掉上次构建的同名产物，校验时不被旧文件误导
    if artifact.is_file() {
        let _ = std::fs::remove_file(&artifact);
    }

    let output = packager.run(&invocation)?;

    // 6. 校验产物并返回结果
    let result = verify_artifact(&output, &artifact, &exe_name, icon_outcome.mode_label())?;
    log::info!("构建完成：{}（{} 字节）", result.exe_path, result.size_bytes);
    Ok(result)
}

// ============================================================================
// 脚本项目转换流程
// ============================================================================

/// 将本地 Python 脚本项目直接打包为可执行程序
///
/// 与 Web 构建共用验证、互斥、调用与校验步骤，差异在于：
/// 不暂存资源、不生成启动脚本、不随附 pywebview 隐藏导入，
/// 打包器工作目录为项目目录本身（保持脚本相对导入可解析）。
/// 图标与中间产物落在独立工作区，最终产物仍输出到 `output_dir`。
pub fn convert_script_project(
    lock: &BuildLock,
    packager: &dyn Packager,
    builds_root: &Path,
    output_dir: &Path,
    request: &ScriptBuildRequest,
) -> AppResult<BuildResult> {
    // 1. 验证请求
    if request.exe_name.trim().is_empty() {
        return Err(AppError::InvalidRequest(
            "可执行文件名不能为空".to_string(),
        ));
    }
    let project_dir = PathBuf::from(&request.project_path);
    if !project_dir.is_dir() {
        return Err(AppError::InvalidFolder(format!(
            "脚本项目目录不存在：{}",
            project_dir.display()
        )));
    }
    let entry_script = find_script_entry(&project_dir)?;

    // 2. 登记构建（以项目路径为互斥键）
    let lock_key = format!("script:{}", project_dir.display());
    lock.try_begin(&lock_key)?;
    let guard_key = lock_key.clone();
    let _lock_guard = scopeguard::guard((), |_| lock.finish(&guard_key));

    log::info!("开始转换脚本项目：{}", project_dir.display());

    // 3. 准备独立工作区（图标与打包器中间产物落在这里）
    let exe_name = sanitize_exe_name(&request.exe_name);
    let workspace = builds_root.join(&exe_name);
    std::fs::create_dir_all(&workspace)?;

    // 4. 图标：解码失败降级为无图标构建
    let icon_outcome = resolve_icon(request.icon_data.as_deref(), &workspace)?;

    // 5. 组装并调用打包器
    let plan = BuildPlan {
        exe_name: exe_name.clone(),
        entry_script,
        output_dir: output_dir.to_path_buf(),
        work_dir: workspace.join("build"),
        spec_dir: workspace.clone(),
        icon_path: icon_outcome.icon_path().map(Path::to_path_buf),
        options: request.options.clone(),
        hidden_imports: Vec::new(),
    };
    let invocation = PackagerInvocation {
        program: PYINSTALLER_PROGRAM.to_string(),
        args: assemble_packager_args(&plan),
        cwd: project_dir.clone(),
    };

    let artifact = predicted_artifact_path(output_dir, &exe_name, plan.options.single_file);
    if artifact.is_file() {
        let _ = std::fs::remove_file(&artifact);
    }

    let output = packager.run(&invocation)?;

    // 6. 校验产物并返回结果
    let result = verify_artifact(&output, &artifact, &exe_name, icon_outcome.mode_label())?;
    log::info!("转换完成：{}（{} 字节）", result.exe_path, result.size_bytes);
    Ok(result)
}

// ============================================================================
// 单元测试
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::dtos::AnalysisReport;
    use crate::registry::{now_timestamp, ProjectRecord};
    use proptest::prelude::*;
    use std::fs;
    use tempfile::TempDir;

    // ========================================================================
    // 记录式假打包器
    // ========================================================================

    /// 测试用打包器：记录每次调用，按配置决定成败与产物落盘
    struct FakePackager {
        succeed: bool,
        write_artifact: bool,
        stdout: String,
        stderr: String,
        invocations: Mutex<Vec<PackagerInvocation>>,
    }

    impl FakePackager {
        fn succeeding() -> Self {
            Self {
                succeed: true,
                write_artifact: true,
                stdout: "INFO: Building EXE".to_string(),
                stderr: String::new(),
                invocations: Mutex::new(Vec::new()),
            }
        }

        fn succeeding_without_artifact() -> Self {
            Self {
                write_artifact: false,
                ..Self::succeeding()
            }
        }

        fn failing(stderr: &str) -> Self {
            Self {
                succeed: false,
                write_artifact: false,
                stdout: String::new(),
                stderr: stderr.to_string(),
                invocations: Mutex::new(Vec::new()),
            }
        }

        fn failing_with_stdout(stdout: &str) -> Self {
            Self {
                succeed: false,
                write_artifact: false,
                stdout: stdout.to_string(),
                stderr: String::new(),
                invocations: Mutex::new(Vec::new()),
            }
        }

        fn invocation_count(&self) -> usize {
            self.invocations.lock().unwrap().len()
        }

        fn last_invocation(&self) -> PackagerInvocation {
            self.invocations.lock().unwrap().last().unwrap().clone()
        }

        /// 按真实打包器的规则从参数推导产物位置
        fn artifact_from_args(args: &[String]) -> Option<PathBuf> {
            let name = args.iter().find_map(|a| a.strip_prefix("--name="))?;
            let dist = args.iter().find_map(|a| a.strip_prefix("--distpath="))?;
            let single_file = args.iter().any(|a| a == "--onefile");
            Some(predicted_artifact_path(Path::new(dist), name, single_file))
        }
    }

    impl Packager for FakePackager {
        fn run(&self, invocation: &PackagerInvocation) -> AppResult<PackagerOutput> {
            self.invocations.lock().unwrap().push(invocation.clone());

            if self.write_artifact {
                if let Some(path) = Self::artifact_from_args(&invocation.args) {
                    if let Some(parent) = path.parent() {
                        fs::create_dir_all(parent).unwrap();
                    }
                    fs::write(&path, b"placeholder executable bytes").unwrap();
                }
            }

            Ok(PackagerOutput {
                success: self.succeed,
                status_code: Some(if self.succeed { 0 } else { 1 }),
                stdout: self.stdout.clone(),
                stderr: self.stderr.clone(),
            })
        }
    }

    // ========================================================================
    // 测试夹具
    // ========================================================================

    fn png_data_uri(width: u32, height: u32) -> String {
        use base64::Engine;
        use image::ImageEncoder;

        let img = image::RgbaImage::from_pixel(width, height, image::Rgba([10, 20, 30, 255]));
        let mut png = Vec::new();
        image::codecs::png::PngEncoder::new(std::io::Cursor::new(&mut png))
            .write_image(&img, width, height, image::ColorType::Rgba8)
            .unwrap();
        format!(
            "data:image/png;base64,{}",
            base64::engine::general_purpose::STANDARD.encode(&png)
        )
    }

    /// 创建注册表、暂存资源与项目记录，返回 (注册表, 产物目录)
    fn setup_web_project(tmp: &TempDir) -> (ProjectRegistry, PathBuf) {
        let registry = ProjectRegistry::open(&tmp.path().join("Web2EXE")).unwrap();

        let staging = tmp.path().join("staging").join("Demo_App");
        fs::create_dir_all(staging.join("css")).unwrap();
        fs::write(staging.join("index.html"), "<html><body>演示</body></html>").unwrap();
        fs::write(staging.join("css/style.css"), "body { margin: 0; }").unwrap();

        let record = ProjectRecord {
            id: "Demo_App".to_string(),
            name: "Demo App".to_string(),
            author: "tester".to_string(),
            version: "1.0.0".to_string(),
            description: "演示项目".to_string(),
            source_folder: staging.display().to_string(),
            staging_folder: staging.display().to_string(),
            created_at: now_timestamp(),
            analysis: AnalysisReport::default(),
        };
        registry.save(&record).unwrap();

        let output = tmp.path().join("downloads");
        fs::create_dir_all(&output).unwrap();
        (registry, output)
    }

    fn web_request() -> WebBuildRequest {
        WebBuildRequest {
            project_id: "Demo_App".to_string(),
            project_name: "Demo App".to_string(),
            icon_data: None,
            options: BuildOptions::default(),
        }
    }

    /// 创建脚本项目目录，返回 (项目目录, 工作区根目录, 产物目录)
    fn setup_script_project(tmp: &TempDir, scripts: &[&str]) -> (PathBuf, PathBuf, PathBuf) {
        let project = tmp.path().join("script_project");
        fs::create_dir_all(&project).unwrap();
        for name in scripts {
            fs::write(project.join(name), "print('你好')").unwrap();
        }
        let builds_root = tmp.path().join("Web2EXE_ScriptBuilds");
        let output = tmp.path().join("downloads");
        fs::create_dir_all(&output).unwrap();
        (project, builds_root, output)
    }

    fn script_request(project: &Path) -> ScriptBuildRequest {
        ScriptBuildRequest {
            project_path: project.display().to_string(),
            exe_name: "My Tool".to_string(),
            icon_data: None,
            options: BuildOptions::default(),
        }
    }

    // ========================================================================
    // Web 构建流程测试
    // ========================================================================

    #[test]
    fn test_build_web_project_success() {
        let tmp = TempDir::new().unwrap();
        let (registry, output) = setup_web_project(&tmp);
        let lock = BuildLock::default();
        let packager = FakePackager::succeeding();

        let result =
            build_web_project(&registry, &lock, &packager, &output, &web_request()).unwrap();

        assert_eq!(result.exe_name, "Demo_App");
        assert_eq!(result.icon_mode, "skipped");
        assert!(result.size_bytes > 0);
        assert!(Path::new(&result.exe_path).is_file());

        // 暂存布局：app/ 资源副本 + main.py 启动脚本
        let build_dir = registry.build_dir("Demo_App");
        assert!(build_dir.join("app/index.html").is_file());
        assert!(build_dir.join("app/css/style.css").is_file());
        let launcher = fs::read_to_string(build_dir.join("main.py")).unwrap();
        assert!(launcher.contains("Demo App"));
        assert!(launcher.contains("index.html"));
        assert!(launcher.contains("webview.create_window"));

        // 调用参数：默认选项 + 必备旗标 + pywebview 隐藏导入
        assert_eq!(packager.invocation_count(), 1);
        let invocation = packager.last_invocation();
        assert_eq!(invocation.cwd, build_dir);
        assert_eq!(invocation.program, PYINSTALLER_PROGRAM);
        assert_eq!(invocation.args.first().map(String::as_str), Some("--onefile"));
        assert!(invocation.args.iter().any(|a| a == "--windowed"));
        assert!(invocation.args.iter().any(|a| a == "--noupx"));
        assert!(invocation.args.iter().any(|a| a == "-y"));
        assert!(invocation.args.iter().any(|a| a == "--hidden-import=webview"));
        assert!(invocation.args.iter().any(|a| a == "--hidden-import=webview.js"));
        assert!(!invocation.args.iter().any(|a| a.starts_with("--icon=")));
    }

    #[test]
    fn test_build_web_project_unknown_id_invokes_nothing() {
        let tmp = TempDir::new().unwrap();
        let (registry, output) = setup_web_project(&tmp);
        let lock = BuildLock::default();
        let packager = FakePackager::succeeding();

        let mut request = web_request();
        request.project_id = "ghost".to_string();
        let result = build_web_project(&registry, &lock, &packager, &output, &request);

        assert!(matches!(result, Err(AppError::InvalidRequest(_))));
        assert_eq!(packager.invocation_count(), 0);
    }

    #[test]
    fn test_build_web_project_empty_name_invokes_nothing() {
        let tmp = TempDir::new().unwrap();
        let (registry, output) = setup_web_project(&tmp);
        let lock = BuildLock::default();
        let packager = FakePackager::succeeding();

        let mut request = web_request();
        request.project_name = "   ".to_string();
        let result = build_web_project(&registry, &lock, &packager, &output, &request);

        assert!(matches!(result, Err(AppError::InvalidRequest(_))));
        assert_eq!(packager.invocation_count(), 0);
    }

    #[test]
    fn test_build_web_project_missing_staging_invokes_nothing() {
        let tmp = TempDir::new().unwrap();
        let (registry, output) = setup_web_project(&tmp);
        let lock = BuildLock::default();
        let packager = FakePackager::succeeding();

        fs::remove_dir_all(tmp.path().join("staging").join("Demo_App")).unwrap();
        let result = build_web_project(&registry, &lock, &packager, &output, &web_request());

        assert!(matches!(result, Err(AppError::InvalidFolder(_))));
        assert_eq!(packager.invocation_count(), 0);
    }

    #[test]
    fn test_build_web_project_packager_failure_surfaces_stderr() {
        let tmp = TempDir::new().unwrap();
        let (registry, output) = setup_web_project(&tmp);
        let lock = BuildLock::default();
        let packager = FakePackager::failing("ModuleNotFoundError: webview");

        let result = build_web_project(&registry, &lock, &packager, &output, &web_request());

        match result {
            Err(AppError::PackagingFailed(detail)) => {
                assert!(detail.contains("ModuleNotFoundError: webview"));
            }
            other => panic!("预期 PackagingFailed，实际：{:?}", other.map(|r| r.exe_path)),
        }
    }

    #[test]
    fn test_build_web_project_failure_falls_back_to_stdout() {
        let tmp = TempDir::new().unwrap();
        let (registry, output) = setup_web_project(&tmp);
        let lock = BuildLock::default();
        let packager = FakePackager::failing_with_stdout("FATAL: spec generation failed");

        let result = build_web_project(&registry, &lock, &packager, &output, &web_request());

        match result {
            Err(AppError::PackagingFailed(detail)) => {
                assert!(detail.contains("FATAL: spec generation failed"));
            }
            _ => panic!("预期 PackagingFailed"),
        }
    }

    #[test]
    fn test_build_web_project_exit_zero_without_artifact() {
        let tmp = TempDir::new().unwrap();
        let (registry, output) = setup_web_project(&tmp);
        let lock = BuildLock::default();
        let packager = FakePackager::succeeding_without_artifact();

        let result = build_web_project(&registry, &lock, &packager, &output, &web_request());

        assert!(matches!(result, Err(AppError::ArtifactMissing(_))));
        assert_eq!(packager.invocation_count(), 1);
    }

    #[test]
    fn test_build_web_project_with_icon() {
        let tmp = TempDir::new().unwrap();
        let (registry, output) = setup_web_project(&tmp);
        let lock = BuildLock::default();
        let packager = FakePackager::succeeding();

        let mut request = web_request();
        request.icon_data = Some(png_data_uri(64, 64));
        let result =
            build_web_project(&registry, &lock, &packager, &output, &request).unwrap();

        assert_eq!(result.icon_mode, "converted");
        let invocation = packager.last_invocation();
        let icon_arg = invocation
            .args
            .iter()
            .find(|a| a.starts_with("--icon="))
            .expect("参数中应包含图标");
        assert!(icon_arg.ends_with("app_icon.ico"));
    }

    #[test]
    fn test_build_web_project_bad_icon_degrades_to_skipped() {
        let tmp = TempDir::new().unwrap();
        let (registry, output) = setup_web_project(&tmp);
        let lock = BuildLock::default();
        let packager = FakePackager::succeeding();

        let mut request = web_request();
        request.icon_data = Some("data:image/png;base64,%%%不是BASE64%%%".to_string());
        let result =
            build_web_project(&registry, &lock, &packager, &output, &request).unwrap();

        assert_eq!(result.icon_mode, "skipped");
        let invocation = packager.last_invocation();
        assert!(!invocation.args.iter().any(|a| a.starts_with("--icon=")));
    }

    #[test]
    fn test_build_web_project_rejected_while_in_progress() {
        let tmp = TempDir::new().unwrap();
        let (registry, output) = setup_web_project(&tmp);
        let lock = BuildLock::default();
        let packager = FakePackager::succeeding();

        lock.try_begin("Demo_App").unwrap();
        let result = build_web_project(&registry, &lock, &packager, &output, &web_request());
        assert!(matches!(result, Err(AppError::BuildInProgress(_))));
        assert_eq!(packager.invocation_count(), 0);

        // 注销后同一项目可以再次构建
        lock.finish("Demo_App");
        build_web_project(&registry, &lock, &packager, &output, &web_request()).unwrap();
    }

    #[test]
    fn test_build_lock_released_after_failure() {
        let tmp = TempDir::new().unwrap();
        let (registry, output) = setup_web_project(&tmp);
        let lock = BuildLock::default();

        let failing = FakePackager::failing("出错了");
        let result = build_web_project(&registry, &lock, &failing, &output, &web_request());
        assert!(result.is_err());

        // 失败的构建必须释放互斥，否则项目被永久卡死
        let succeeding = FakePackager::succeeding();
        build_web_project(&registry, &lock, &succeeding, &output, &web_request()).unwrap();
    }

    #[test]
    fn test_build_web_project_options_change_flags() {
        let tmp = TempDir::new().unwrap();
        let (registry, output) = setup_web_project(&tmp);
        let lock = BuildLock::default();
        let packager = FakePackager::succeeding();

        let mut request = web_request();
        request.options = BuildOptions {
            single_file: false,
            hide_console: false,
            optimize: true,
        };
        let result =
            build_web_project(&registry, &lock, &packager, &output, &request).unwrap();

        let invocation = packager.last_invocation();
        assert_eq!(invocation.args.first().map(String::as_str), Some("--onedir"));
        assert!(!invocation.args.iter().any(|a| a == "--windowed"));
        assert!(invocation.args.iter().any(|a| a == "--optimize"));

        // 目录模式的产物嵌套在同名子目录内
        assert!(result.exe_path.contains("Demo_App"));
        assert!(Path::new(&result.exe_path).is_file());
    }

    // ========================================================================
    // 脚本转换流程测试
    // ========================================================================

    #[test]
    fn test_convert_script_project_success() {
        let tmp = TempDir::new().unwrap();
        let (project, builds_root, output) =
            setup_script_project(&tmp, &["main.py", "helper.py"]);
        let lock = BuildLock::default();
        let packager = FakePackager::succeeding();

        let result = convert_script_project(
            &lock,
            &packager,
            &builds_root,
            &output,
            &script_request(&project),
        )
        .unwrap();

        assert_eq!(result.exe_name, "My_Tool");
        assert_eq!(result.icon_mode, "skipped");
        assert!(Path::new(&result.exe_path).is_file());
        // 产物落在输出目录，工作区只放中间文件
        assert!(result.exe_path.starts_with(&output.display().to_string()));
        assert!(builds_root.join("My_Tool").is_dir());

        let invocation = packager.last_invocation();
        assert_eq!(invocation.cwd, project);
        assert!(invocation
            .args
            .last()
            .map(|a| a.ends_with("main.py"))
            .unwrap_or(false));
        assert!(!invocation.args.iter().any(|a| a.starts_with("--hidden-import=")));
    }

    #[test]
    fn test_convert_script_project_entry_preference() {
        let tmp = TempDir::new().unwrap();
        let (project, builds_root, output) = setup_script_project(&tmp, &["zeta.py", "app.py"]);
        let lock = BuildLock::default();
        let packager = FakePackager::succeeding();

        convert_script_project(
            &lock,
            &packager,
            &builds_root,
            &output,
            &script_request(&project),
        )
        .unwrap();

        let invocation = packager.last_invocation();
        assert!(invocation
            .args
            .last()
            .map(|a| a.ends_with("app.py"))
            .unwrap_or(false));
    }

    #[test]
    fn test_convert_script_project_alphabetical_fallback() {
        let tmp = TempDir::new().unwrap();
        let (project, builds_root, output) =
            setup_script_project(&tmp, &["tool_b.py", "tool_a.py"]);
        let lock = BuildLock::default();
        let packager = FakePackager::succeeding();

        convert_script_project(
            &lock,
            &packager,
            &builds_root,
            &output,
            &script_request(&project),
        )
        .unwrap();

        let invocation = packager.last_invocation();
        assert!(invocation
            .args
            .last()
            .map(|a| a.ends_with("tool_a.py"))
            .unwrap_or(false));
    }

    #[test]
    fn test_convert_script_project_without_scripts_invokes_nothing() {
        let tmp = TempDir::new().unwrap();
        let (project, builds_root, output) = setup_script_project(&tmp, &[]);
        fs::write(project.join("readme.txt"), "没有脚本").unwrap();
        let lock = BuildLock::default();
        let packager = FakePackager::succeeding();

        let result = convert_script_project(
            &lock,
            &packager,
            &builds_root,
            &output,
            &script_request(&project),
        );

        assert!(matches!(result, Err(AppError::InvalidRequest(_))));
        assert_eq!(packager.invocation_count(), 0);
    }

    #[test]
    fn test_convert_script_project_missing_folder() {
        let tmp = TempDir::new().unwrap();
        let builds_root = tmp.path().join("builds");
        let output = tmp.path().join("downloads");
        let lock = BuildLock::default();
        let packager = FakePackager::succeeding();

        let request = ScriptBuildRequest {
            project_path: tmp.path().join("不存在").display().to_string(),
            exe_name: "Tool".to_string(),
            icon_data: None,
            options: BuildOptions::default(),
        };
        let result = convert_script_project(&lock, &packager, &builds_root, &output, &request);

        assert!(matches!(result, Err(AppError::InvalidFolder(_))));
        assert_eq!(packager.invocation_count(), 0);
    }

    // ========================================================================
    // 辅助函数测试
    // ========================================================================

    #[test]
    fn test_build_lock_per_key() {
        let lock = BuildLock::default();

        lock.try_begin("a").unwrap();
        assert!(matches!(
            lock.try_begin("a"),
            Err(AppError::BuildInProgress(_))
        ));
        // 不同项目互不影响
        lock.try_begin("b").unwrap();

        lock.finish("a");
        lock.try_begin("a").unwrap();
    }

    #[test]
    fn test_sanitize_exe_name() {
        assert_eq!(sanitize_exe_name("My Cool App"), "My_Cool_App");
        assert_eq!(sanitize_exe_name("  trimmed  "), "trimmed");
        assert_eq!(sanitize_exe_name("plain"), "plain");
    }

    #[test]
    fn test_predicted_artifact_path_layouts() {
        let out = Path::new("/out");
        let file_name = if cfg!(windows) { "app.exe" } else { "app" };

        assert_eq!(
            predicted_artifact_path(out, "app", true),
            out.join(file_name)
        );
        assert_eq!(
            predicted_artifact_path(out, "app", false),
            out.join("app").join(file_name)
        );
    }

    #[test]
    fn test_assemble_packager_args_order_and_content() {
        let plan = BuildPlan {
            exe_name: "demo".to_string(),
            entry_script: PathBuf::from("/work/main.py"),
            output_dir: PathBuf::from("/out"),
            work_dir: PathBuf::from("/work/build"),
            spec_dir: PathBuf::from("/work"),
            icon_path: Some(PathBuf::from("/work/app_icon.ico")),
            options: BuildOptions::default(),
            hidden_imports: vec!["webview".to_string()],
        };
        let args = assemble_packager_args(&plan);

        assert_eq!(args.first().map(String::as_str), Some("--onefile"));
        assert_eq!(args.last().map(String::as_str), Some("/work/main.py"));
        assert!(args.contains(&"--windowed".to_string()));
        assert!(args.contains(&"--name=demo".to_string()));
        assert!(args.contains(&"--distpath=/out".to_string()));
        assert!(args.contains(&"--workpath=/work/build".to_string()));
        assert!(args.contains(&"--specpath=/work".to_string()));
        assert!(args.contains(&"--hidden-import=webview".to_string()));
        assert!(args.contains(&"--icon=/work/app_icon.ico".to_string()));
        // 默认不启用字节码优化
        assert!(!args.contains(&"--optimize".to_string()));
    }

    #[test]
    fn test_render_launcher_script_is_deterministic() {
        let app_dir = Path::new("/builds/demo/app");
        let first = render_launcher_script("Demo App", app_dir, "pages/index.html");
        let second = render_launcher_script("Demo App", app_dir, "pages/index.html");

        assert_eq!(first, second);
        assert!(first.contains("APP_DIR = r\"/builds/demo/app\""));
        assert!(first.contains("\"Demo App\""));
        assert!(first.contains("\"pages/index.html\""));
        assert!(first.contains("webview.start(debug=False, http_server=False)"));
    }

    #[test]
    fn test_find_entry_page_prefers_root_index() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("docs")).unwrap();
        fs::write(tmp.path().join("about.html"), "<html></html>").unwrap();
        fs::write(tmp.path().join("index.html"), "<html></html>").unwrap();
        fs::write(tmp.path().join("docs/index.html"), "<html></html>").unwrap();

        assert_eq!(find_entry_page(tmp.path()).unwrap(), "index.html");
    }

    #[test]
    fn test_find_entry_page_falls_back_to_nested_index() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("pages")).unwrap();
        fs::write(tmp.path().join("about.html"), "<html></html>").unwrap();
        fs::write(tmp.path().join("pages/index.html"), "<html></html>").unwrap();

        assert_eq!(find_entry_page(tmp.path()).unwrap(), "pages/index.html");
    }

    #[test]
    fn test_find_entry_page_without_html_fails() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("style.css"), "body {}").unwrap();

        let result = find_entry_page(tmp.path());
        assert!(matches!(result, Err(AppError::InvalidFolder(_))));
    }

    #[test]
    fn test_copy_dir_excluding_skips_ignored_dirs() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("src");
        fs::create_dir_all(src.join("node_modules/pkg")).unwrap();
        fs::create_dir_all(src.join("assets")).unwrap();
        fs::write(src.join("index.html"), "<html></html>").unwrap();
        fs::write(src.join("assets/logo.png"), "png").unwrap();
        fs::write(src.join("node_modules/pkg/index.js"), "module").unwrap();

        let dst = tmp.path().join("dst");
        copy_dir_excluding(&src, &dst, IGNORED_DIRS).unwrap();

        assert!(dst.join("index.html").is_file());
        assert!(dst.join("assets/logo.png").is_file());
        assert!(!dst.join("node_modules").exists());
    }

    #[test]
    fn test_copy_dir_excluding_overwrites_existing_files() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("src");
        let dst = tmp.path().join("dst");
        fs::create_dir_all(&src).unwrap();
        fs::create_dir_all(&dst).unwrap();
        fs::write(src.join("index.html"), "新内容").unwrap();
        fs::write(dst.join("index.html"), "旧内容").unwrap();

        copy_dir_excluding(&src, &dst, IGNORED_DIRS).unwrap();

        assert_eq!(
            fs::read_to_string(dst.join("index.html")).unwrap(),
            "新内容"
        );
    }

    // ========================================================================
    // 编排属性测试 (Property-Based Tests)
    // ========================================================================

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// Feature: web2exe-studio-v1, Property 6: Packager Flag Grammar
        ///
        /// 对任意构建选项组合，参数列表必须以打包模式开头、以入口脚本结尾，
        /// 打包模式恰好出现一次，且 --windowed 当且仅当隐藏控制台时出现。
        ///
        /// **Validates: Requirements 5.5, 9.3**
        #[test]
        fn prop_packager_flag_grammar(
            single_file: bool,
            hide_console: bool,
            optimize: bool,
            name in "[a-zA-Z][a-zA-Z0-9_]{0,16}"
        ) {
            let plan = BuildPlan {
                exe_name: name.clone(),
                entry_script: PathBuf::from("/work/main.py"),
                output_dir: PathBuf::from("/out"),
                work_dir: PathBuf::from("/work/build"),
                spec_dir: PathBuf::from("/work"),
                icon_path: None,
                options: BuildOptions { single_file, hide_console, optimize },
                hidden_imports: Vec::new(),
            };
            let args = assemble_packager_args(&plan);

            let mode = if single_file { "--onefile" } else { "--onedir" };
            prop_assert_eq!(args.first().map(String::as_str), Some(mode));
            prop_assert_eq!(
                args.iter()
                    .filter(|a| matches!(a.as_str(), "--onefile" | "--onedir"))
                    .count(),
                1
            );
            prop_assert_eq!(args.iter().any(|a| a == "--windowed"), hide_console);
            prop_assert_eq!(args.iter().any(|a| a == "--optimize"), optimize);
            prop_assert!(args.contains(&format!("--name={}", name)));
            prop_assert_eq!(args.last().map(String::as_str), Some("/work/main.py"));
        }
    }
}

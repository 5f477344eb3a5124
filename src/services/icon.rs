// ============================================================================
// 图标管线服务：data URI 解码、栅格 → ICO 转换、显式降级策略
// ✅ 只能做：base64 解码、图像处理、持久化写盘
// ⛔ 禁止：依赖 tauri::*，调用外部进程
// ============================================================================

use crate::utils::error::{AppError, AppResult};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use image::imageops::FilterType;
use image::GenericImageView;
use std::fs::File;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};

/// ICO 容器单帧边长上限，同时是图标的最小目标尺寸
const ICON_TARGET_SIZE: u32 = 256;

/// 图标处理结果标签（有序降级策略的显式产出）
#[derive(Debug, Clone, PartialEq)]
pub enum IconOutcome {
    /// 载荷本身就是 ICO 容器，落盘后直接使用
    Native { path: PathBuf },
    /// 栅格图已转换为 ICO；resized 标记是否触发了最小尺寸放大
    Converted { path: PathBuf, resized: bool },
    /// 转换失败，降级使用原始字节文件
    UsedRawFallback { path: PathBuf, reason: String },
    /// 未提供图标载荷（或载荷解码失败后由编排层降级）
    Skipped,
}

impl IconOutcome {
    /// 交给打包器的图标路径（Skipped 时为 None）
    pub fn icon_path(&self) -> Option<&Path> {
        match self {
            IconOutcome::Native { path } => Some(path),
            IconOutcome::Converted { path, .. } => Some(path),
            IconOutcome::UsedRawFallback { path, .. } => Some(path),
            IconOutcome::Skipped => None,
        }
    }

    /// 返回给前端的模式标签
    pub fn mode_label(&self) -> &'static str {
        match self {
            IconOutcome::Native { .. } => "native",
            IconOutcome::Converted { .. } => "converted",
            IconOutcome::UsedRawFallback { .. } => "raw-fallback",
            IconOutcome::Skipped => "skipped",
        }
    }
}

/// 解析 data URI 载荷
///
/// 格式要求 `data:<媒体类型>[;base64],<正文>`。缺少 data: 前缀、缺少逗号
/// 分隔符或 base64 非法均视为载荷格式错误，此时不写入任何文件。
///
/// # 返回
/// - `Ok((媒体类型, 解码字节))`
/// - `Err(AppError::IconDecode)`: 载荷格式错误
pub fn parse_data_uri(data_uri: &str) -> AppResult<(String, Vec<u8>)> {
    let rest = data_uri
        .strip_prefix("data:")
        .ok_or_else(|| AppError::IconDecode("缺少 data: 前缀".to_string()))?;

    let (header, body) = rest
        .split_once(',')
        .ok_or_else(|| AppError::IconDecode("缺少逗号分隔符".to_string()))?;

    let media = header.split(';').next().unwrap_or("").to_string();

    let bytes = STANDARD
        .decode(body)
        .map_err(|e| AppError::IconDecode(format!("base64 解码失败：{}", e)))?;

    Ok((media, bytes))
}

/// 持久化写入：write_all 后 flush + sync_all，保证外部进程读取前已落盘
pub fn write_durable(path: &Path, bytes: &[u8]) -> AppResult<()> {
    let mut file = File::create(path)?;
    file.write_all(bytes)?;
    file.flush()?;
    file.sync_all()?;
    Ok(())
}

/// 处理图标载荷：解码、按需转换，返回显式结果标签
///
/// 已是 ICO 容器的载荷直接落盘使用；其它媒体类型按栅格图转换。
/// 转换失败不致命：原始字节文件作为降级产物返回。
///
/// # 参数
/// - `data_uri`: data URI 载荷
/// - `work_dir`: 临时文件与 ICO 的落盘目录（须已存在）
/// - `icon_stem`: 输出 ICO 的文件名主干（通常为可执行文件名）
pub fn prepare_icon(data_uri: &str, work_dir: &Path, icon_stem: &str) -> AppResult<IconOutcome> {
    let (media, bytes) = parse_data_uri(data_uri)?;

    if is_icon_container(&media) {
        let path = work_dir.join(format!("{}.ico", icon_stem));
        write_durable(&path, &bytes)?;
        return Ok(IconOutcome::Native { path });
    }

    // 先落盘原始栅格字节，转换失败时作为降级产物
    let raster_path = work_dir.join(format!("temp_icon.{}", raster_extension(&media)));
    write_durable(&raster_path, &bytes)?;

    let ico_path = work_dir.join(format!("{}.ico", icon_stem));
    match convert_raster_to_ico(&bytes, &ico_path) {
        Ok(resized) => {
            // 转换成功后临时栅格文件不再需要
            let _ = std::fs::remove_file(&raster_path);
            Ok(IconOutcome::Converted {
                path: ico_path,
                resized,
            })
        }
        Err(reason) => {
            log::warn!("图标转换失败，降级使用原始字节：{}", reason);
            Ok(IconOutcome::UsedRawFallback {
                path: raster_path,
                reason,
            })
        }
    }
}

/// 判断媒体类型是否已是图标容器（x-icon、vnd.microsoft.icon、image/ico）
fn is_icon_container(media: &str) -> bool {
    media.contains("ico")
}

/// 由媒体子类型派生临时文件扩展名（仅保留字母数字）
fn raster_extension(media: &str) -> String {
    let subtype = media.rsplit('/').next().unwrap_or("");
    let ext: String = subtype
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect();
    if ext.is_empty() {
        "bin".to_string()
    } else {
        ext
    }
}

/// 栅格字节 → 单帧 ICO，返回是否触发了最小尺寸放大
///
/// 任一边小于 256 时用 Lanczos3 放大到 256×256（计为 resized）；
/// 任一边超过容器单帧上限时同样压到 256×256（容器约束，不计 resized）。
/// 带透明通道的图先平铺到白色底再编码。
fn convert_raster_to_ico(bytes: &[u8], ico_path: &Path) -> Result<bool, String> {
    let img = image::load_from_memory(bytes).map_err(|e| format!("栅格解码失败：{}", e))?;
    let (width, height) = img.dimensions();

    let needs_upscale = width < ICON_TARGET_SIZE || height < ICON_TARGET_SIZE;
    let needs_clamp = width > ICON_TARGET_SIZE || height > ICON_TARGET_SIZE;
    let img = if needs_upscale || needs_clamp {
        img.resize_exact(ICON_TARGET_SIZE, ICON_TARGET_SIZE, FilterType::Lanczos3)
    } else {
        img
    };

    let rgb = if img.color().has_alpha() {
        flatten_onto_white(&img)
    } else {
        img.to_rgb8()
    };

    let mut buf = Cursor::new(Vec::new());
    image::DynamicImage::ImageRgb8(rgb)
        .write_to(&mut buf, image::ImageOutputFormat::Ico)
        .map_err(|e| format!("ICO 编码失败：{}", e))?;
    write_durable(ico_path, buf.get_ref()).map_err(|e| e.to_string())?;

    Ok(needs_upscale)
}

/// 透明像素按 alpha 混合到白色背景
fn flatten_onto_white(img: &image::DynamicImage) -> image::RgbImage {
    let rgba = img.to_rgba8();
    let (width, height) = rgba.dimensions();
    let mut flat = image::RgbImage::from_pixel(width, height, image::Rgb([255, 255, 255]));
    for (x, y, px) in rgba.enumerate_pixels() {
        let alpha = px[3] as u32;
        let inverse = 255 - alpha;
        let blend = |c: u8| ((c as u32 * alpha + 255 * inverse) / 255) as u8;
        flat.put_pixel(x, y, image::Rgb([blend(px[0]), blend(px[1]), blend(px[2])]));
    }
    flat
}

// ============================================================================
// 单元测试
// ============================================================================

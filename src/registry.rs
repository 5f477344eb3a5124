// ============================================================================
// 项目注册表模块：JSON 文档持久化层
// 每个项目一个记录目录（project.json + build/ 工作区），遵循 KISS 原则
// ============================================================================

use crate::models::dtos::AnalysisReport;
use crate::utils::error::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

// ============================================================================
// 数据结构定义
// ============================================================================

/// 项目记录，整篇序列化为记录目录下的 project.json
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProjectRecord {
    /// 目录安全的稳定标识，创建后不可变
    pub id: String,
    /// 项目显示名称
    pub name: String,
    /// 作者
    pub author: String,
    /// 版本号
    pub version: String,
    /// 项目描述
    pub description: String,
    /// 用户选择的源目录
    pub source_folder: String,
    /// 资源暂存目录（下载目录下，以净化后的标识命名）
    pub staging_folder: String,
    /// 创建时间（RFC 3339）
    pub created_at: String,
    /// 创建时的技术栈分析报告
    pub analysis: AnalysisReport,
}

// ============================================================================
// 注册表管理器
// ============================================================================

/// 项目注册表，管理 `<root>/<id>/project.json` 与 `<root>/<id>/build/` 目录树
pub struct ProjectRegistry {
    root: PathBuf,
}

impl ProjectRegistry {
    /// 打开注册表：根目录不存在时创建
    ///
    /// # 参数
    /// - `root`: 注册表根目录（通常为文档目录下的 Web2EXE）
    pub fn open(root: &Path) -> AppResult<Self> {
        std::fs::create_dir_all(root)?;
        Ok(ProjectRegistry {
            root: root.to_path_buf(),
        })
    }

    /// 注册表根目录
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// 项目记录目录
    pub fn project_dir(&self, id: &str) -> PathBuf {
        self.root.join(id)
    }

    /// 项目构建工作目录
    pub fn build_dir(&self, id: &str) -> PathBuf {
        self.project_dir(id).join("build")
    }

    /// 记录文档路径
    fn record_path(&self, id: &str) -> PathBuf {
        self.project_dir(id).join("project.json")
    }

    /// 保存项目记录（整篇重写，不做局部更新）
    pub fn save(&self, record: &ProjectRecord) -> AppResult<()> {
        let dir = self.project_dir(&record.id);
        std::fs::create_dir_all(&dir)?;

        let json = serde_json::to_string_pretty(record)
            .map_err(|e| AppError::Registry(format!("记录序列化失败：{}", e)))?;
        std::fs::write(self.record_path(&record.id), json)?;
        Ok(())
    }

    /// 按标识读取项目记录
    ///
    /// # 返回
    /// - `Err(AppError::InvalidRequest)`: 记录不存在
    /// - `Err(AppError::Registry)`: 记录文档损坏
    pub fn load(&self, id: &str) -> AppResult<ProjectRecord> {
        let path = self.record_path(id);
        if !path.is_file() {
            return Err(AppError::InvalidRequest(format!("项目记录不存在：{}", id)));
        }

        let content = std::fs::read_to_string(&path)?;
        serde_json::from_str(&content)
            .map_err(|e| AppError::Registry(format!("记录解析失败 {}：{}", path.display(), e)))
    }

    /// 列出全部可读的项目记录（按标识排序）
    ///
    /// 缺失或损坏的记录条目记一条警告后跳过，不使整个列表失败。
    pub fn list(&self) -> AppResult<Vec<ProjectRecord>> {
        let mut records = Vec::new();

        for entry in std::fs::read_dir(&self.root)? {
            let entry = match entry {
                Ok(e) => e,
                Err(_) => continue,
            };
            if !entry.file_type().map(|t| t.is_dir()).unwrap_or(false) {
                continue;
            }
            let id = entry.file_name().to_string_lossy().to_string();
            match self.load(&id) {
                Ok(record) => records.push(record),
                Err(e) => log::warn!("跳过不可读的项目记录 {}：{}", id, e),
            }
        }

        records.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(records)
    }
}

// ============================================================================
// 辅助函数
// ============================================================================

/// 由项目名派生目录安全的记录标识
///
/// 空格替换为下划线，去除路径敏感字符与控制字符。
/// 结果为空或为相对路径别名（`.`/`..`）视为无效请求。
pub fn sanitize_project_id(name: &str) -> AppResult<String> {
    const HOSTILE: &[char] = &['/', '\\', ':', '*', '?', '"', '<', '>', '|'];

    let filtered: String = name
        .trim()
        .chars()
        .map(|c| if c == ' ' { '_' } else { c })
        .filter(|c| !HOSTILE.contains(c) && !c.is_control())
        .collect();
    // 过滤可能在两端暴露出新的空白字符，再修剪一次保证派生幂等
    let id = filtered.trim().to_string();

    if id.is_empty() || id == "." || id == ".." {
        return Err(AppError::InvalidRequest(
            "项目名称无法派生有效标识".to_string(),
        ));
    }
    Ok(id)
}

/// 当前时间的 RFC 3339 文本（本地时区，取不到偏移时退回 UTC）
pub fn now_timestamp() -> String {
    let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
    now.format(&Rfc3339).unwrap_or_default()
}

// ============================================================================
// 单元测试
// ============================================================================

//! frps 配置文档模型与编解码
//!
//! 磁盘上的 TOML 文本 <-> `ConfigDocument`（section -> key -> value）。
//!
//! 编解码只保证语义等价：`parse(serialize(doc))` 得到相同的 section/key/value 集合。
//! 注释、空行以及键的书写顺序/格式不会被保留，写回磁盘的是规范化后的 TOML。

use indexmap::IndexMap;
use thiserror::Error;
use toml::{Table, Value};

/// 顶层键所在的 section 名称
pub const ROOT_SECTION: &str = "";

/// 单个 section 内的键值对
pub type Section = IndexMap<String, Value>;

/// 配置编解码错误
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("config is not valid UTF-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    #[error("invalid TOML: {0}")]
    Syntax(#[from] toml::de::Error),

    #[error("structured config must be a JSON object")]
    NotAnObject,

    #[error("invalid structured config at {path}: {reason}")]
    Structure { path: String, reason: String },

    #[error("unsupported section name {0:?}")]
    UnsupportedName(String),

    #[error("key {key:?} in section {section:?} collides with a section of the same name")]
    Collision { section: String, key: String },

    #[error("failed to render TOML: {0}")]
    Render(#[from] toml::ser::Error),
}

/// 结构化的 frps 配置
///
/// 顶层键放在 [`ROOT_SECTION`]，嵌套表按点分路径展开为 section（`webServer`、`transport.tls`）。
/// 没有任何键的 section 与不存在的 section 视为相等。
#[derive(Debug, Clone, Default)]
pub struct ConfigDocument {
    sections: IndexMap<String, Section>,
}

impl ConfigDocument {
    pub fn new() -> Self {
        Self::default()
    }

    /// 解析磁盘上的原始字节，要么完整成功要么返回错误
    pub fn parse(raw: &[u8]) -> Result<Self, CodecError> {
        let text = std::str::from_utf8(raw)?;
        let table: Table = toml::from_str(text)?;
        Self::from_table(table)
    }

    /// 渲染为 TOML 字节
    pub fn serialize(&self) -> Result<Vec<u8>, CodecError> {
        let table = self.to_table()?;
        Ok(toml::to_string(&table)?.into_bytes())
    }

    /// 从前端提交的 JSON 对象构建（与 `to_json` 的嵌套形状一致）
    pub fn from_json(value: &serde_json::Value) -> Result<Self, CodecError> {
        let serde_json::Value::Object(map) = value else {
            return Err(CodecError::NotAnObject);
        };

        let mut table = Table::new();
        for (key, value) in map {
            table.insert(key.clone(), json_to_toml(value, key)?);
        }
        Self::from_table(table)
    }

    /// 嵌套 JSON 视图
    pub fn to_json(&self) -> Result<serde_json::Value, CodecError> {
        let table = self.to_table()?;
        Ok(table_to_json(&table))
    }

    /// 写入一个键值
    ///
    /// 表类型的值必须以 section 表达；键与子 section 同名、或 section 路径与祖先 section 的键同名时拒绝。
    pub fn insert(
        &mut self,
        section: &str,
        key: &str,
        value: Value,
    ) -> Result<Option<Value>, CodecError> {
        if matches!(value, Value::Table(_)) {
            return Err(CodecError::Structure {
                path: join(section, key),
                reason: "tables must be expressed as sections".to_string(),
            });
        }
        validate_section_name(section)?;

        if !key.contains('.') && self.occupies(&join(section, key)) {
            return Err(CodecError::Collision {
                section: section.to_string(),
                key: key.to_string(),
            });
        }

        let mut parent = String::new();
        if !section.is_empty() {
            for segment in section.split('.') {
                let taken = self
                    .sections
                    .get(&parent)
                    .is_some_and(|entries| entries.contains_key(segment));
                if taken {
                    return Err(CodecError::Collision {
                        section: parent,
                        key: segment.to_string(),
                    });
                }
                parent = join(&parent, segment);
            }
        }

        Ok(self
            .sections
            .entry(section.to_string())
            .or_default()
            .insert(key.to_string(), value))
    }

    pub fn get(&self, section: &str, key: &str) -> Option<&Value> {
        self.sections.get(section).and_then(|entries| entries.get(key))
    }

    pub fn section(&self, name: &str) -> Option<&Section> {
        self.sections.get(name)
    }

    /// 键的总数
    pub fn len(&self) -> usize {
        self.sections.values().map(IndexMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn from_table(table: Table) -> Result<Self, CodecError> {
        let mut doc = Self::default();
        doc.flatten(ROOT_SECTION, table)?;
        Ok(doc)
    }

    fn flatten(&mut self, path: &str, table: Table) -> Result<(), CodecError> {
        let mut entries = Section::new();
        let mut children = Vec::new();

        for (key, value) in table {
            match value {
                Value::Table(child) => {
                    if key.is_empty() || key.contains('.') {
                        return Err(CodecError::UnsupportedName(join(path, &key)));
                    }
                    children.push((join(path, &key), child));
                }
                other => {
                    entries.insert(key, other);
                }
            }
        }

        if !entries.is_empty() || children.is_empty() {
            self.sections.insert(path.to_string(), entries);
        }
        for (name, child) in children {
            self.flatten(&name, child)?;
        }
        Ok(())
    }

    fn to_table(&self) -> Result<Table, CodecError> {
        // 先写浅层 section，保证每张表自己的键先于子表插入
        let mut ordered: Vec<(&String, &Section)> = self.sections.iter().collect();
        ordered.sort_by_key(|(name, _)| depth(name));

        let mut root = Table::new();
        for (name, entries) in ordered {
            let table = table_at(&mut root, name)?;
            for (key, value) in entries {
                table.insert(key.clone(), value.clone());
            }
        }
        Ok(root)
    }

    /// `path` 是否已被某个 section（或其后代）占用
    fn occupies(&self, path: &str) -> bool {
        let prefix = format!("{}.", path);
        self.sections
            .keys()
            .any(|name| name == path || name.starts_with(&prefix))
    }
}

impl PartialEq for ConfigDocument {
    fn eq(&self, other: &Self) -> bool {
        let lhs: Vec<_> = self.sections.iter().filter(|(_, s)| !s.is_empty()).collect();
        let rhs_count = other.sections.values().filter(|s| !s.is_empty()).count();

        lhs.len() == rhs_count
            && lhs
                .iter()
                .all(|(name, entries)| other.sections.get(*name) == Some(*entries))
    }
}

fn join(parent: &str, child: &str) -> String {
    if parent.is_empty() {
        child.to_string()
    } else {
        format!("{}.{}", parent, child)
    }
}

fn depth(section: &str) -> usize {
    if section.is_empty() {
        0
    } else {
        section.split('.').count()
    }
}

fn validate_section_name(section: &str) -> Result<(), CodecError> {
    if !section.is_empty() && section.split('.').any(str::is_empty) {
        return Err(CodecError::UnsupportedName(section.to_string()));
    }
    Ok(())
}

fn table_at<'a>(root: &'a mut Table, section: &str) -> Result<&'a mut Table, CodecError> {
    let mut current = root;
    let mut parent = String::new();
    if section.is_empty() {
        return Ok(current);
    }

    for segment in section.split('.') {
        let slot = current
            .entry(segment.to_string())
            .or_insert_with(|| Value::Table(Table::new()));
        current = match slot {
            Value::Table(table) => table,
            _ => {
                return Err(CodecError::Collision {
                    section: parent,
                    key: segment.to_string(),
                })
            }
        };
        parent = join(&parent, segment);
    }
    Ok(current)
}

fn json_to_toml(value: &serde_json::Value, path: &str) -> Result<Value, CodecError> {
    let invalid = |reason: &str| CodecError::Structure {
        path: path.to_string(),
        reason: reason.to_string(),
    };

    Ok(match value {
        serde_json::Value::Null => return Err(invalid("null is not representable in TOML")),
        serde_json::Value::Bool(b) => Value::Boolean(*b),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::Integer(i)
            } else if n.is_u64() {
                return Err(invalid("integer out of range"));
            } else {
                Value::Float(n.as_f64().ok_or_else(|| invalid("invalid number"))?)
            }
        }
        serde_json::Value::String(s) => Value::String(s.clone()),
        serde_json::Value::Array(items) => Value::Array(
            items
                .iter()
                .enumerate()
                .map(|(i, item)| json_to_toml(item, &format!("{}[{}]", path, i)))
                .collect::<Result<_, _>>()?,
        ),
        serde_json::Value::Object(map) => {
            let mut table = Table::new();
            for (key, item) in map {
                table.insert(key.clone(), json_to_toml(item, &join(path, key))?);
            }
            Value::Table(table)
        }
    })
}

fn toml_to_json(value: &Value) -> serde_json::Value {
    match value {
        Value::String(s) => serde_json::Value::String(s.clone()),
        Value::Integer(i) => serde_json::Value::from(*i),
        Value::Float(f) => serde_json::Number::from_f64(*f)
            .map(serde_json::Value::Number)
            .unwrap_or_else(|| serde_json::Value::String(f.to_string())),
        Value::Boolean(b) => serde_json::Value::Bool(*b),
        Value::Datetime(dt) => serde_json::Value::String(dt.to_string()),
        Value::Array(items) => serde_json::Value::Array(items.iter().map(toml_to_json).collect()),
        Value::Table(table) => table_to_json(table),
    }
}

fn table_to_json(table: &Table) -> serde_json::Value {
    serde_json::Value::Object(
        table
            .iter()
            .map(|(key, value)| (key.clone(), toml_to_json(value)))
            .collect(),
    )
}

use serde::{Deserialize, Serialize};

/// 富化服务中"未找到"的哨兵值，与空串 / 空白不同
pub const NOT_FOUND: &str = "Not found";

/// 实验结构的默认分类
pub const CLASSIFICATION_EXPERIMENTAL: &str = "experimental";
/// AlphaFold / RosettaFold 等预测模型的分类
pub const CLASSIFICATION_SIMULATED: &str = "simulated";

/// 水模型类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WaterModelType {
    Explicit,
    Implicit,
}

/// 检测到的水模型；泛指短语（如 "explicit solvent"）只有类型没有名称
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WaterModel {
    pub name: Option<String>,
    pub kind: WaterModelType,
}

/// 一条属性观测值
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttributeKind {
    Software { name: String, version: Option<String> },
    Water(WaterModel),
    ForceField(String),
    Method(String),
    /// 开尔文
    Temperature(f64),
    /// 浓度单位为 mM
    Ion { name: String, concentration_mm: Option<f64> },
    /// 纳秒
    Duration(i64),
}

/// 属性观测 + 来源句子偏移（仅用于调试）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeObservation {
    pub kind: AttributeKind,
    pub sentence_offset: usize,
}

/// 候选记录：交叉组合的基本单元
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CandidateRecord {
    pub structure_id: String,
    pub classification: Option<String>,
    pub organism: Option<String>,
    /// 结构测定方法（X-RAY DIFFRACTION 等），由富化填充
    pub experimental_method: Option<String>,
    pub software_name: Option<String>,
    pub software_version: Option<String>,
    pub water_model: Option<String>,
    pub water_model_type: Option<WaterModelType>,
    pub force_field: Option<String>,
    pub simulation_method: Option<String>,
    pub temperature: Option<f64>,
    pub ion: Option<String>,
    pub ion_concentration: Option<f64>,
    /// 纳秒
    pub simulation_length: Option<i64>,
}

/// 去重键：字符串字段统一小写，浮点按位比较
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CandidateKey {
    strings: [Option<String>; 10],
    water_model_type: Option<WaterModelType>,
    temperature: Option<u64>,
    ion_concentration: Option<u64>,
    simulation_length: Option<i64>,
}

fn fold(value: &Option<String>) -> Option<String> {
    value.as_ref().map(|s| s.trim().to_lowercase())
}

fn float_bits(value: Option<f64>) -> Option<u64> {
    // -0.0 与 0.0 视为相同
    value.map(|v| if v == 0.0 { 0.0f64.to_bits() } else { v.to_bits() })
}

impl CandidateRecord {
    pub fn dedup_key(&self) -> CandidateKey {
        CandidateKey {
            strings: [
                Some(self.structure_id.trim().to_lowercase()),
                fold(&self.classification),
                fold(&self.organism),
                fold(&self.experimental_method),
                fold(&self.software_name),
                fold(&self.software_version),
                fold(&self.water_model),
                fold(&self.force_field),
                fold(&self.simulation_method),
                fold(&self.ion),
            ],
            water_model_type: self.water_model_type,
            temperature: float_bits(self.temperature),
            ion_concentration: float_bits(self.ion_concentration),
            simulation_length: self.simulation_length,
        }
    }

    /// classification / organism / method 是否全部为空白
    pub fn lacks_structure_signal(&self) -> bool {
        [&self.classification, &self.organism, &self.experimental_method]
            .iter()
            .all(|field| field.as_deref().map_or(true, |v| v.trim().is_empty()))
    }
}

/// 富化字段：值或"未找到"哨兵
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EnrichmentField {
    Value(String),
    NotFound,
}

impl EnrichmentField {
    /// 按字符串解析，`"Not found"` 映射为哨兵
    pub fn parse(raw: Option<&str>) -> Self {
        match raw {
            Some(v) if v.trim().eq_ignore_ascii_case(NOT_FOUND) => EnrichmentField::NotFound,
            Some(v) => EnrichmentField::Value(v.to_string()),
            None => EnrichmentField::NotFound,
        }
    }

    pub fn value(&self) -> Option<&str> {
        match self {
            EnrichmentField::Value(v) => Some(v),
            EnrichmentField::NotFound => None,
        }
    }
}

/// 结构富化结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrichmentResult {
    pub structure_id: String,
    pub classification: EnrichmentField,
    pub organism: EnrichmentField,
    pub method: EnrichmentField,
}

impl EnrichmentResult {
    pub fn not_found(structure_id: impl Into<String>) -> Self {
        Self {
            structure_id: structure_id.into(),
            classification: EnrichmentField::NotFound,
            organism: EnrichmentField::NotFound,
            method: EnrichmentField::NotFound,
        }
    }

    /// 三个字段全部为"未找到"
    pub fn is_all_not_found(&self) -> bool {
        [&self.classification, &self.organism, &self.method]
            .iter()
            .all(|field| **field == EnrichmentField::NotFound)
    }
}

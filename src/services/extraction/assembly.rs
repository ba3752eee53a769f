//! 候选记录组装与去重

use std::collections::HashSet;

use crate::models::{AttributeKind, AttributeObservation, CandidateRecord, WaterModel};

use super::identifiers::DiscoveredIdentifier;

/// 一篇文章按维度汇总后的属性
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AttributeSet {
    pub software: Vec<(String, Option<String>)>,
    pub water_models: Vec<WaterModel>,
    pub force_fields: Vec<String>,
    pub methods: Vec<String>,
    pub temperatures: Vec<f64>,
    pub ions: Vec<(String, Option<f64>)>,
    pub durations: Vec<i64>,
}

fn push_unique<T: PartialEq>(items: &mut Vec<T>, item: T) {
    if !items.contains(&item) {
        items.push(item);
    }
}

impl AttributeSet {
    /// 汇总观测值
    ///
    /// - 同一软件既有带版本又有无版本的观测时，丢弃无版本的
    /// - 力场去掉是其他力场子串的项（保留最具体的）
    pub fn from_observations(observations: &[AttributeObservation]) -> Self {
        let mut set = AttributeSet::default();

        for observation in observations {
            match &observation.kind {
                AttributeKind::Software { name, version } => {
                    push_unique(&mut set.software, (name.clone(), version.clone()))
                }
                AttributeKind::Water(model) => push_unique(&mut set.water_models, model.clone()),
                AttributeKind::ForceField(name) => {
                    if !set.force_fields.iter().any(|f| f.eq_ignore_ascii_case(name)) {
                        set.force_fields.push(name.clone());
                    }
                }
                AttributeKind::Method(name) => push_unique(&mut set.methods, name.clone()),
                AttributeKind::Temperature(value) => {
                    if !set.temperatures.iter().any(|t| t.to_bits() == value.to_bits()) {
                        set.temperatures.push(*value);
                    }
                }
                AttributeKind::Ion { name, concentration_mm } => {
                    let duplicate = set.ions.iter().any(|(n, c)| {
                        n == name && c.map(f64::to_bits) == concentration_mm.map(f64::to_bits)
                    });
                    if !duplicate {
                        set.ions.push((name.clone(), *concentration_mm));
                    }
                }
                AttributeKind::Duration(ns) => push_unique(&mut set.durations, *ns),
            }
        }

        let versioned: HashSet<String> = set
            .software
            .iter()
            .filter(|(_, version)| version.is_some())
            .map(|(name, _)| name.to_lowercase())
            .collect();
        set.software
            .retain(|(name, version)| version.is_some() || !versioned.contains(&name.to_lowercase()));

        let lowered: Vec<String> = set.force_fields.iter().map(|f| f.to_lowercase()).collect();
        set.force_fields = set
            .force_fields
            .iter()
            .zip(&lowered)
            .filter(|(_, this)| {
                !lowered
                    .iter()
                    .any(|other| other.len() > this.len() && other.contains(this.as_str()))
            })
            .map(|(name, _)| name.clone())
            .collect();

        set
    }

    /// 交叉组合前的候选数（空维度按 1 计）
    pub fn combination_count(&self) -> usize {
        [
            self.software.len(),
            self.water_models.len(),
            self.force_fields.len(),
            self.methods.len(),
            self.temperatures.len(),
            self.ions.len(),
            self.durations.len(),
        ]
        .iter()
        .map(|&n| n.max(1))
        .product()
    }
}

/// 空维度用一个 `None` 占位，保证没有该维度观测时仍能产出记录
fn dimension<T: Clone>(items: &[T]) -> Vec<Option<T>> {
    if items.is_empty() {
        vec![None]
    } else {
        items.iter().cloned().map(Some).collect()
    }
}

/// 对每个标识符做全维度交叉组合（未去重）
pub fn assemble_candidates(identifiers: &[DiscoveredIdentifier], attributes: &AttributeSet) -> Vec<CandidateRecord> {
    let software = dimension(&attributes.software);
    let water_models = dimension(&attributes.water_models);
    let force_fields = dimension(&attributes.force_fields);
    let methods = dimension(&attributes.methods);
    let temperatures = dimension(&attributes.temperatures);
    let ions = dimension(&attributes.ions);
    let durations = dimension(&attributes.durations);

    let mut records = Vec::with_capacity(identifiers.len() * attributes.combination_count());
    for identifier in identifiers {
        for sw in &software {
            for water in &water_models {
                for force_field in &force_fields {
                    for method in &methods {
                        for temperature in &temperatures {
                            for ion in &ions {
                                for duration in &durations {
                                    records.push(CandidateRecord {
                                        structure_id: identifier.id.clone(),
                                        classification: Some(identifier.classification.to_string()),
                                        software_name: sw.as_ref().map(|(name, _)| name.clone()),
                                        software_version: sw.as_ref().and_then(|(_, v)| v.clone()),
                                        water_model: water.as_ref().and_then(|w| w.name.clone()),
                                        water_model_type: water.as_ref().map(|w| w.kind),
                                        force_field: force_field.clone(),
                                        simulation_method: method.clone(),
                                        temperature: *temperature,
                                        ion: ion.as_ref().map(|(name, _)| name.clone()),
                                        ion_concentration: ion.as_ref().and_then(|(_, c)| *c),
                                        simulation_length: *duration,
                                        ..Default::default()
                                    });
                                }
                            }
                        }
                    }
                }
            }
        }
    }
    records
}

/// 按组合键去重，保留首次出现的记录
pub fn dedup_candidates(records: Vec<CandidateRecord>) -> Vec<CandidateRecord> {
    let mut seen = HashSet::new();
    records
        .into_iter()
        .filter(|record| seen.insert(record.dedup_key()))
        .collect()
}

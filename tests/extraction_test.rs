mod common;

use std::collections::HashSet;

use md_harvest::clients::PatternDurationNormalizer;
use md_harvest::models::{CandidateRecord, Vocabulary, WaterModelType};
use md_harvest::services::extraction::CompiledVocabulary;
use md_harvest::services::{enrich_and_filter, ExtractionEngine};

use common::{MissingEnrichment, MockEnrichment, METHODS_TEXT};

async fn extract(text: &str) -> Vec<CandidateRecord> {
    let engine = ExtractionEngine::new().unwrap();
    let vocabulary = CompiledVocabulary::compile(&Vocabulary::builtin()).unwrap();
    let normalizer = PatternDurationNormalizer::new().unwrap();
    engine.extract(text, &vocabulary, &normalizer).await
}

#[tokio::test]
async fn test_methods_paragraph_yields_expected_record() {
    let records = extract(METHODS_TEXT).await;

    assert_eq!(records.len(), 1);
    let record = &records[0];
    assert_eq!(record.structure_id, "1ABC");
    assert_eq!(record.classification.as_deref(), Some("experimental"));
    assert_eq!(record.water_model.as_deref(), Some("TIP3P"));
    assert_eq!(record.water_model_type, Some(WaterModelType::Explicit));
    assert_eq!(record.temperature, Some(310.0));
    assert_eq!(record.software_name.as_deref(), Some("GROMACS"));
    assert_eq!(record.software_version.as_deref(), Some("2020.4"));
    assert_eq!(record.simulation_length, Some(100));
}

#[tokio::test]
async fn test_figure_reference_is_not_a_temperature() {
    let text = "The crystal structure (PDB code 2XYZ) is shown. As seen in Fig. 3K the loop moves.";
    let records = extract(text).await;

    assert_eq!(records.len(), 1);
    assert_eq!(records[0].temperature, None);
}

#[tokio::test]
async fn test_ion_concentrations_in_millimolar() {
    let text = "Starting coordinates were taken from PDB entry 3HTB. \
                The box contained 5 µM Zn2+ and 2 M NaCl.";
    let records = extract(text).await;

    let ions: HashSet<(String, u64)> = records
        .iter()
        .map(|r| (r.ion.clone().unwrap(), r.ion_concentration.unwrap().to_bits()))
        .collect();
    assert_eq!(
        ions,
        HashSet::from([
            ("Zn2+".to_string(), 0.005f64.to_bits()),
            ("NaCl".to_string(), 2000.0f64.to_bits()),
        ])
    );
}

#[tokio::test]
async fn test_extraction_is_idempotent() {
    let text = format!("{}\n{}", METHODS_TEXT, METHODS_TEXT);
    let first = extract(&text).await;
    let second = extract(&text).await;
    let single = extract(METHODS_TEXT).await;

    let keys = |records: &[CandidateRecord]| records.iter().map(|r| r.dedup_key()).collect::<HashSet<_>>();
    assert_eq!(keys(&first), keys(&second));
    assert_eq!(keys(&first), keys(&single));
}

#[tokio::test]
async fn test_cross_product_over_independent_dimensions() {
    let text = "The crystal structure (PDB code 1ABC) was used. \
                Simulations were run with GROMACS 2020.4 and NAMD 2.14. \
                Systems were equilibrated at 300 K, 310 K and 320 K.";
    let records = extract(text).await;

    // 1 个标识符 × 2 个软件 × 3 个温度
    assert_eq!(records.len(), 6);
    let temperatures: HashSet<u64> = records.iter().filter_map(|r| r.temperature).map(f64::to_bits).collect();
    assert_eq!(temperatures.len(), 3);
}

#[tokio::test]
async fn test_predicted_models_survive_enrichment_without_lookup() {
    let text = "The model of the receptor was predicted with AlphaFold and simulated for 50 ns.";
    let records = extract(text).await;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].structure_id, "ALPHAFOLD");

    let enrichment = MockEnrichment::default();
    let kept = enrich_and_filter(records, &enrichment).await;
    assert_eq!(kept.len(), 1);
    assert_eq!(kept[0].classification.as_deref(), Some("simulated"));
    assert!(enrichment.lookups.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_structure_unknown_to_enrichment_is_dropped() {
    let records = extract(METHODS_TEXT).await;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].classification.as_deref(), Some("experimental"));

    let enrichment = MissingEnrichment::default();
    let kept = enrich_and_filter(records, &enrichment).await;
    assert!(kept.is_empty());
    assert_eq!(*enrichment.lookups.lock().unwrap(), vec!["1ABC".to_string()]);
}

#[tokio::test]
async fn test_only_unknown_structures_are_dropped() {
    let text = "The crystal structure (PDB code 1ABC) was used. \
                The model of the receptor was predicted with AlphaFold and simulated for 50 ns.";
    let records = extract(text).await;
    let ids: HashSet<&str> = records.iter().map(|r| r.structure_id.as_str()).collect();
    assert_eq!(ids, HashSet::from(["1ABC", "ALPHAFOLD"]));

    let kept = enrich_and_filter(records, &MissingEnrichment::default()).await;
    assert!(!kept.is_empty());
    assert!(kept.iter().all(|r| r.structure_id == "ALPHAFOLD"));
}

//! Dataset file formats: triplet text files, wide CSV, and the model-level
//! loader with its format inference.

use approx::assert_relative_eq;
use kinfit_rs::data::{io, ConcentrationData};
use kinfit_rs::error::KinFitError;
use kinfit_rs::{DataCategory, ReactionModel};
use std::io::Write;

fn temp_file(contents: &str, suffix: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

#[test]
fn triplet_concentration_file_into_model() {
    let file = temp_file(
        "# time component value\n\
         0.0 A 1.0\n\
         0.0 B 0.0\n\
         1.0 A 0.37\n\
         1.0 B 0.63\n\
         2.0 A 0.14\n\
         2.0 B 0.86\n",
        ".txt",
    );

    let mut model = ReactionModel::new("io");
    model.add_parameter("k1", 1.0).unwrap();
    model.add_component("A", 1.0).unwrap();
    model.add_component("B", 0.0).unwrap();
    model.add_ode("A", "-k1 * A").unwrap();
    model.add_ode("B", "k1 * A").unwrap();

    model
        .add_data_file(DataCategory::Concentration, file.path())
        .unwrap();

    let data = model.concentration_data().unwrap();
    assert_eq!(data.n_times(), 3);
    assert_eq!(data.components(), &["A".to_string(), "B".to_string()]);
    assert_relative_eq!(data.column("B").unwrap()[2], 0.86);

    // Horizon is inferred from the data span
    assert!(model.validate().is_ok());
}

#[test]
fn triplet_spectral_file_round_trip() {
    let mut contents = String::new();
    for (i, t) in [0.0, 0.5, 1.0].iter().enumerate() {
        for (j, wl) in [210.0, 220.0, 230.0, 240.0].iter().enumerate() {
            contents.push_str(&format!("{} {} {}\n", t, wl, (i * 4 + j) as f64 * 0.1));
        }
    }
    let file = temp_file(&contents, ".txt");

    let data = io::read_spectral_txt(file.path()).unwrap();
    assert_eq!(data.n_times(), 3);
    assert_eq!(data.n_wavelengths(), 4);
    assert_relative_eq!(data.absorbance()[[2, 3]], 1.1);

    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("spectra.txt");
    io::write_spectral_txt(&data, &out).unwrap();
    let back = io::read_spectral_txt(&out).unwrap();
    assert_eq!(back.absorbance(), data.absorbance());
    assert_eq!(back.wavelengths(), data.wavelengths());
}

#[test]
fn csv_extension_switches_the_reader() {
    let file = temp_file(
        "time,A,B\n0.0,1.0,0.0\n1.0,0.4,0.6\n",
        ".csv",
    );

    let mut model = ReactionModel::new("csv");
    model.add_parameter("k1", 1.0).unwrap();
    model.add_component("A", 1.0).unwrap();
    model.add_component("B", 0.0).unwrap();
    model.add_ode("A", "-k1 * A").unwrap();
    model.add_ode("B", "k1 * A").unwrap();
    model
        .add_data_file(DataCategory::Concentration, file.path())
        .unwrap();

    let data = model.concentration_data().unwrap();
    assert_eq!(data.n_times(), 2);
    assert_relative_eq!(data.column("B").unwrap()[1], 0.6);
}

#[test]
fn csv_empty_cells_are_missing_measurements() {
    let file = temp_file("time,A,B\n0.0,1.0,\n1.0,,0.6\n", ".csv");
    let data = io::read_concentration_csv(file.path()).unwrap();

    assert!(data.values()[[0, 1]].is_nan());
    assert!(data.values()[[1, 0]].is_nan());
    assert_eq!(data.n_measurements(), 2);
}

#[test]
fn malformed_rows_name_file_and_line() {
    let file = temp_file("0.0 A 1.0\n1.0 A\n", ".txt");
    match io::read_concentration_txt(file.path()) {
        Err(KinFitError::DataFormat { line, reason, .. }) => {
            assert_eq!(line, 2);
            assert!(reason.contains("3 fields"));
        }
        other => panic!("expected format error, got {:?}", other),
    }

    let file = temp_file("0.0 200 1.0\n0.0 abc 2.0\n", ".txt");
    match io::read_spectral_txt(file.path()) {
        Err(KinFitError::DataFormat { line, .. }) => assert_eq!(line, 2),
        other => panic!("expected wavelength error, got {:?}", other),
    }
}

#[test]
fn unknown_component_in_file_is_rejected_by_the_model() {
    let file = temp_file("0.0 Q 1.0\n1.0 Q 0.5\n", ".txt");

    let mut model = ReactionModel::new("strict");
    model.add_component("A", 1.0).unwrap();
    model.add_ode("A", "-A").unwrap();

    match model.add_data_file(DataCategory::Concentration, file.path()) {
        Err(KinFitError::UnknownVariable(name)) => assert_eq!(name, "Q"),
        other => panic!("expected unknown-variable error, got {:?}", other),
    }
}

#[test]
fn msc_preprocessing_is_available_through_the_model() {
    // Build a small spectral dataset with multiplicative scatter
    let mut contents = String::new();
    let base = [1.0, 2.0, 3.0];
    for (i, scale) in [1.0, 2.0].iter().enumerate() {
        for (j, wl) in [200.0, 210.0, 220.0].iter().enumerate() {
            contents.push_str(&format!("{} {} {}\n", i as f64, wl, scale * base[j]));
        }
    }
    let file = temp_file(&contents, ".txt");

    let mut model = ReactionModel::new("msc");
    model.add_component("A", 1.0).unwrap();
    model.add_ode("A", "-A").unwrap();
    model
        .add_data_file(DataCategory::Spectral, file.path())
        .unwrap();

    model.spectra_mut().unwrap().msc();
    let d = model.spectra().unwrap().absorbance();
    // After correction both spectra collapse onto the same shape
    for j in 0..3 {
        assert_relative_eq!(d[[0, j]], d[[1, j]], epsilon = 1e-8);
    }
}

#[test]
fn concentration_json_parameters_round_trip() {
    // Parameters survive save/load with bounds and units
    let mut model = ReactionModel::new("persist");
    model.add_parameter_with_bounds("k1", 2.0, 0.0, 5.0).unwrap();
    model.add_parameter("k2", 0.2).unwrap();
    model
        .parameters_mut()
        .get_mut("k1")
        .unwrap()
        .set_units(Some("1/min"));

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("params.json");
    model.parameters().save_json(&path).unwrap();

    let loaded = kinfit_rs::Parameters::load_json(&path).unwrap();
    assert_eq!(loaded.names(), model.parameters().names());
    assert_eq!(loaded.get("k1").unwrap().units(), Some("1/min"));
    assert_eq!(loaded.get("k1").unwrap().max(), 5.0);
}

#[test]
fn triplet_writer_preserves_sparsity() {
    let data = ConcentrationData::from_columns(
        vec![0.0, 1.0],
        vec![
            ("A".to_string(), vec![1.0, 0.5]),
            ("B".to_string(), vec![f64::NAN, 0.4]),
        ],
    )
    .unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sparse.txt");
    io::write_concentration_txt(&data, &path).unwrap();

    let contents = std::fs::read_to_string(&path).unwrap();
    assert_eq!(contents.lines().count(), 3);

    let back = io::read_concentration_txt(&path).unwrap();
    assert!(back.values()[[0, 1]].is_nan());
    assert_eq!(back.n_measurements(), 3);
}

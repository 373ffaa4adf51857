use neuroseg::NamingContract;

#[test]
fn allowed_file_matches_compound_suffix() {
    let naming = NamingContract::default();
    assert!(naming.allowed_file("subject.nii.gz"));
    assert!(!naming.allowed_file("subject.nii"));
    assert!(!naming.allowed_file("noext"));
    assert!(!naming.allowed_file("subject.v2.nii.gz"));
}

#[test]
fn custom_contract_replaces_default_suffixes() {
    let naming = NamingContract {
        allowed_suffixes: vec!["nii".to_string(), "nii.gz".to_string()],
        ..NamingContract::default()
    };
    assert!(naming.allowed_file("subject.nii"));
    assert!(naming.allowed_file("subject.nii.gz"));
    assert!(!naming.allowed_file("subject.mgz"));
}

#[test]
fn renamed_strips_marker_and_appends_final_suffix() {
    let naming = NamingContract::default();
    assert_eq!(
        naming.renamed("A_Warped.nii.gz").as_deref(),
        Some("A_0000.nii.gz")
    );
    assert_eq!(
        naming.renamed("sub1Warped.nii.gz").as_deref(),
        Some("sub1_0000.nii.gz")
    );
}

#[test]
fn inverse_and_transform_outputs_are_not_candidates() {
    let naming = NamingContract::default();
    assert!(!naming.is_registered_candidate("A_InverseWarped.nii.gz"));
    assert_eq!(naming.renamed("A_InverseWarped.nii.gz"), None);
    assert_eq!(naming.renamed("A_0GenericAffine.mat"), None);
    assert_eq!(naming.renamed("A_1Warp.nii.gz"), None);
}

#[test]
fn final_suffix_identifies_kept_artifacts() {
    let naming = NamingContract::default();
    assert!(naming.is_final("x_0000.nii.gz"));
    assert!(!naming.is_final("x_0GenericAffine.mat"));
}

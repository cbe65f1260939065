// Tests module
// Scenarios de bout en bout et propriétés du moteur d'exécution

pub mod support;

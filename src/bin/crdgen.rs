use kube::CustomResourceExt;
use pulp_operator::crd::Pulp;

fn main() -> Result<(), serde_yaml::Error> {
    print!("{}", serde_yaml::to_string(&Pulp::crd())?);
    Ok(())
}

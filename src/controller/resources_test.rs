//! Unit tests for the desired-state synthesizer.
//!
//! Run with: `cargo test -p pulp-operator resources_test`

#[cfg(test)]
mod tests {
    use k8s_openapi::api::core::v1::{Container, EnvVar};
    use serde_json::{json, Value};

    use crate::controller::environment::EnvironmentFacts;
    use crate::controller::fake::{test_pulp, test_pulp_with};
    use crate::controller::resources::{
        build_component_service, build_database_service, build_database_statefulset,
        build_deployment, build_file_storage_pvc, build_postgres_secret, build_web_service,
        component_labels, content_pod_selector, database_uses_claim, generate_password,
        owner_reference, synthesize, Component,
    };
    use crate::crd::Pulp;

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    fn with_default_class() -> EnvironmentFacts {
        EnvironmentFacts {
            default_storage_class: true,
            ..Default::default()
        }
    }

    fn container(pulp: &Pulp, component: Component, claim: Option<&str>) -> Container {
        build_deployment(pulp, component, claim)
            .spec
            .unwrap()
            .template
            .spec
            .unwrap()
            .containers
            .remove(0)
    }

    fn env_value<'a>(env: &'a [EnvVar], name: &str) -> Option<&'a str> {
        env.iter()
            .find(|e| e.name == name)
            .and_then(|e| e.value.as_deref())
    }

    /// Paths of every empty array or object under `value`
    fn empty_collections(value: &Value, path: &str, found: &mut Vec<String>) {
        match value {
            Value::Array(items) if items.is_empty() => found.push(path.to_string()),
            Value::Object(map) if map.is_empty() && !path.ends_with("emptyDir") => {
                found.push(path.to_string())
            }
            Value::Array(items) => {
                for (i, item) in items.iter().enumerate() {
                    empty_collections(item, &format!("{path}/{i}"), found);
                }
            }
            Value::Object(map) => {
                for (key, item) in map {
                    empty_collections(item, &format!("{path}/{key}"), found);
                }
            }
            _ => {}
        }
    }

    // -----------------------------------------------------------------------
    // Names and labels
    // -----------------------------------------------------------------------

    #[test]
    fn test_component_labels() {
        let pulp = test_pulp("example");
        let labels = component_labels(&pulp, "api");

        assert_eq!(labels["app.kubernetes.io/name"], "pulp-api");
        assert_eq!(labels["app.kubernetes.io/instance"], "pulp-api-example");
        assert_eq!(labels["app.kubernetes.io/component"], "api");
        assert_eq!(labels["app.kubernetes.io/part-of"], "pulp");
        assert_eq!(labels["app.kubernetes.io/managed-by"], "pulp-operator");
        assert_eq!(labels["pulp_cr"], "example");
    }

    #[test]
    fn test_content_selector_matches_content_pods() {
        let pulp = test_pulp("example");
        let labels = component_labels(&pulp, "content");
        let selector = content_pod_selector(&pulp);

        assert!(selector.iter().all(|(k, v)| labels.get(k) == Some(v)));
        assert!(!component_labels(&pulp, "api")
            .iter()
            .all(|(k, v)| selector.get(k).map_or(true, |s| s == v)));
    }

    #[test]
    fn test_deployment_type_prefixes_labels() {
        let pulp = test_pulp_with("galaxy", json!({ "deploymentType": "galaxy" }));
        let labels = component_labels(&pulp, "worker");
        assert_eq!(labels["app.kubernetes.io/name"], "galaxy-worker");
        assert_eq!(labels["app.kubernetes.io/managed-by"], "galaxy-operator");
    }

    #[test]
    fn test_owner_reference_points_at_pulp() {
        let pulp = test_pulp("example");
        let owner = owner_reference(&pulp);
        assert_eq!(owner.kind, "Pulp");
        assert_eq!(owner.api_version, "repo-manager.pulpproject.org/v1alpha1");
        assert_eq!(owner.uid, "uid-example");
        assert_eq!(owner.controller, Some(true));
    }

    // -----------------------------------------------------------------------
    // Database
    // -----------------------------------------------------------------------

    #[test]
    fn test_postgres_secret_contents() {
        let pulp = test_pulp("example");
        let secret = build_postgres_secret(&pulp, "s3cret");
        let data = secret.string_data.unwrap();

        assert_eq!(secret.metadata.name.as_deref(), Some("example-postgres-configuration"));
        assert_eq!(data["password"], "s3cret");
        assert_eq!(data["host"], "example-database-svc");
        assert_eq!(data["port"], "5432");
        assert_eq!(data["username"], "pulp");
    }

    #[test]
    fn test_generated_passwords_are_random() {
        let a = generate_password();
        let b = generate_password();
        assert_eq!(a.len(), 32);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(a, b);
    }

    #[test]
    fn test_database_claim_requires_a_storage_class() {
        let pulp = test_pulp("example");
        assert!(!database_uses_claim(&pulp, &EnvironmentFacts::default()));
        assert!(database_uses_claim(&pulp, &with_default_class()));

        let explicit = test_pulp_with(
            "example",
            json!({ "database": { "postgresStorageClass": "fast" } }),
        );
        assert!(database_uses_claim(&explicit, &EnvironmentFacts::default()));
    }

    #[test]
    fn test_database_claim_template_uses_requested_size() {
        let pulp = test_pulp_with(
            "example",
            json!({ "database": { "postgresStorageRequirements": "20Gi", "postgresStorageClass": "fast" } }),
        );
        let sts = build_database_statefulset(&pulp, &EnvironmentFacts::default());
        let value = serde_json::to_value(&sts).unwrap();

        assert_eq!(
            value.pointer("/spec/volumeClaimTemplates/0/spec/resources/requests/storage"),
            Some(&json!("20Gi"))
        );
        assert_eq!(
            value.pointer("/spec/volumeClaimTemplates/0/spec/storageClassName"),
            Some(&json!("fast"))
        );
        assert!(value.pointer("/spec/template/spec/volumes").is_none());
    }

    #[test]
    fn test_database_service_is_headless() {
        let pulp = test_pulp("example");
        let svc = build_database_service(&pulp).spec.unwrap();
        assert_eq!(svc.cluster_ip.as_deref(), Some("None"));
        assert_eq!(svc.ports.unwrap()[0].port, 5432);
    }

    // -----------------------------------------------------------------------
    // File storage
    // -----------------------------------------------------------------------

    #[test]
    fn test_file_storage_claim() {
        let pulp = test_pulp_with("example", json!({ "fileStorageSize": "50Gi" }));
        assert!(build_file_storage_pvc(&pulp, &EnvironmentFacts::default()).is_none());

        let pvc = build_file_storage_pvc(&pulp, &with_default_class()).unwrap();
        let spec = pvc.spec.unwrap();
        assert_eq!(spec.access_modes.unwrap(), ["ReadWriteOnce"]);
        assert_eq!(
            spec.resources.unwrap().requests.unwrap()["storage"].0,
            "50Gi"
        );
    }

    #[test]
    fn test_object_storage_replaces_file_claim() {
        let pulp = test_pulp_with("example", json!({ "objectStorageS3Secret": "s3" }));
        let facts = EnvironmentFacts {
            default_storage_class: true,
            object_storage: true,
            ..Default::default()
        };
        assert!(build_file_storage_pvc(&pulp, &facts).is_none());

        let api = container(&pulp, Component::Api, None);
        assert_eq!(
            env_value(api.env.as_ref().unwrap(), "PULP_DEFAULT_FILE_STORAGE"),
            Some("storages.backends.s3boto3.S3Boto3Storage")
        );
        let env_from = api.env_from.unwrap();
        assert_eq!(env_from[0].secret_ref.as_ref().unwrap().name.as_deref(), Some("s3"));
    }

    // -----------------------------------------------------------------------
    // Components
    // -----------------------------------------------------------------------

    #[test]
    fn test_api_gets_scratch_volumes_without_claim() {
        let pulp = test_pulp("example");
        let api = container(&pulp, Component::Api, None);
        let mounts: Vec<String> = api
            .volume_mounts
            .unwrap()
            .into_iter()
            .map(|m| m.mount_path)
            .collect();
        assert_eq!(mounts, ["/var/lib/pulp/tmp", "/var/lib/pulp/assets"]);

        let worker = container(&pulp, Component::Worker, None);
        assert!(worker.volume_mounts.is_none());
    }

    #[test]
    fn test_components_share_the_file_claim() {
        let pulp = test_pulp("example");
        for component in [Component::Api, Component::Content, Component::Worker] {
            let deployment = build_deployment(&pulp, component, Some("example-file-storage"));
            let volumes = deployment.spec.unwrap().template.spec.unwrap().volumes.unwrap();
            assert_eq!(
                volumes[0].persistent_volume_claim.as_ref().unwrap().claim_name,
                "example-file-storage"
            );
        }
        let web = build_deployment(&pulp, Component::Web, Some("example-file-storage"));
        assert!(web.spec.unwrap().template.spec.unwrap().volumes.is_none());
    }

    #[test]
    fn test_component_images_and_replicas() {
        let pulp = test_pulp_with(
            "example",
            json!({ "imageVersion": "3.49", "imageWebVersion": "3.49.1", "worker": { "replicas": 4 } }),
        );

        assert_eq!(
            container(&pulp, Component::Api, None).image.as_deref(),
            Some("quay.io/pulp/pulp-minimal:3.49")
        );
        assert_eq!(
            container(&pulp, Component::Web, None).image.as_deref(),
            Some("quay.io/pulp/pulp-web:3.49.1")
        );
        let worker = build_deployment(&pulp, Component::Worker, None);
        assert_eq!(worker.spec.unwrap().replicas, Some(4));
    }

    #[test]
    fn test_components_read_connection_from_secret() {
        let pulp = test_pulp("example");
        let env = container(&pulp, Component::Content, None).env.unwrap();
        let host = env.iter().find(|e| e.name == "POSTGRES_SERVICE_HOST").unwrap();
        let selector = host
            .value_from
            .as_ref()
            .and_then(|v| v.secret_key_ref.as_ref())
            .unwrap();
        assert_eq!(selector.name.as_deref(), Some("example-postgres-configuration"));
        assert_eq!(selector.key, "host");
    }

    #[test]
    fn test_content_origin_follows_exposure() {
        let route = test_pulp_with(
            "example",
            json!({ "ingressType": "route", "routeHost": "pulp.example.com" }),
        );
        let env = container(&route, Component::Api, None).env.unwrap();
        assert_eq!(env_value(&env, "PULP_CONTENT_ORIGIN"), Some("https://pulp.example.com"));

        let nodeport = test_pulp("example");
        let env = container(&nodeport, Component::Api, None).env.unwrap();
        assert_eq!(
            env_value(&env, "PULP_CONTENT_ORIGIN"),
            Some("http://example-content-svc.default.svc:24816")
        );
    }

    // -----------------------------------------------------------------------
    // Services
    // -----------------------------------------------------------------------

    #[test]
    fn test_component_service_ports() {
        let pulp = test_pulp("example");
        let api = build_component_service(&pulp, Component::Api).spec.unwrap();
        let content = build_component_service(&pulp, Component::Content).spec.unwrap();

        assert!(api.type_.is_none());
        assert_eq!(api.ports.unwrap()[0].name.as_deref(), Some("api-24817"));
        assert_eq!(content.ports.unwrap()[0].port, 24816);
    }

    #[test]
    fn test_web_service_type_follows_ingress_type() {
        let cases = [
            (json!({}), "NodePort"),
            (json!({ "ingressType": "loadbalancer" }), "LoadBalancer"),
            (
                json!({ "ingressType": "ingress", "ingressHost": "pulp.example.com" }),
                "ClusterIP",
            ),
        ];
        for (spec, expected) in cases {
            let pulp = test_pulp_with("example", spec);
            let svc = build_web_service(&pulp).spec.unwrap();
            assert_eq!(svc.type_.as_deref(), Some(expected));
        }

        let pinned = test_pulp_with("example", json!({ "nodeportPort": 30080 }));
        let ports = build_web_service(&pinned).spec.unwrap().ports.unwrap();
        assert_eq!(ports[0].node_port, Some(30080));
    }

    // -----------------------------------------------------------------------
    // Whole desired state
    // -----------------------------------------------------------------------

    #[test]
    fn test_synthesize_route_mode_has_no_web() {
        let pulp = test_pulp_with(
            "example",
            json!({ "ingressType": "route", "routeHost": "pulp.example.com" }),
        );
        let desired = synthesize(&pulp, &EnvironmentFacts::default());
        assert!(desired.web.is_none());
        assert!(desired.worker.service.is_none());
        assert!(desired.database.is_some());
    }

    #[test]
    fn test_synthesize_external_database() {
        let pulp = test_pulp_with(
            "example",
            json!({ "database": { "externalDbSecret": "external-db" } }),
        );
        let facts = EnvironmentFacts {
            external_database: true,
            ..Default::default()
        };
        assert!(synthesize(&pulp, &facts).database.is_none());
    }

    #[test]
    fn test_synthesize_is_deterministic() {
        let pulp = test_pulp("example");
        let facts = with_default_class();
        let a = serde_json::to_value(synthesize(&pulp, &facts).api.deployment).unwrap();
        let b = serde_json::to_value(synthesize(&pulp, &facts).api.deployment).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_desired_objects_carry_no_empty_collections() {
        let pulp = test_pulp("example");
        for facts in [EnvironmentFacts::default(), with_default_class()] {
            let desired = synthesize(&pulp, &facts);
            let mut objects = vec![
                serde_json::to_value(&desired.api.deployment).unwrap(),
                serde_json::to_value(&desired.content.deployment).unwrap(),
                serde_json::to_value(&desired.worker.deployment).unwrap(),
            ];
            if let Some(db) = &desired.database {
                objects.push(serde_json::to_value(&db.statefulset).unwrap());
                objects.push(serde_json::to_value(&db.service).unwrap());
            }
            if let Some(web) = &desired.web {
                objects.push(serde_json::to_value(&web.deployment).unwrap());
            }

            let mut found = Vec::new();
            for object in &objects {
                empty_collections(object, "", &mut found);
            }
            assert!(found.is_empty(), "empty collections at {found:?}");
        }
    }
}

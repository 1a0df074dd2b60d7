use serde::Deserialize;
use tracing::info;

use crate::config::IdConfig;
use crate::error::{AppError, AppResult};
use crate::ids;
use crate::model::{now_iso, Actor, Faculty, Gender};
use crate::store::Store;

pub const PLACEHOLDER_BIODATA: &str = "Auto-created from bulk import";
pub const PLACEHOLDER_DESIGNATION: &str = "Faculty";
const PLACEHOLDER_EMAIL_DOMAIN: &str = "@faculty.edu";
const TITLE_MARKERS: [&str; 3] = ["sh.", "dr.", "prof."];

const MAX_NAME_LEN: usize = 100;
const MAX_EMAIL_LEN: usize = 100;
const MAX_BATCH_LEN: usize = 100;
const MAX_BIODATA_LEN: usize = 1000;

/// Case-insensitive exact name match; the first record in insertion order wins.
pub fn find_by_name<'a>(faculties: &'a [Faculty], name: &str) -> Option<&'a Faculty> {
    let wanted = name.to_lowercase();
    faculties.iter().find(|f| f.name.to_lowercase() == wanted)
}

pub fn placeholder_email(name: &str) -> String {
    let mut local = name.to_lowercase().replace(' ', ".");
    for marker in TITLE_MARKERS {
        local = local.replace(marker, "");
    }
    format!("{}{}", local.trim(), PLACEHOLDER_EMAIL_DOMAIN)
}

pub fn placeholder(id: String, name: &str, created_by: &str) -> Faculty {
    Faculty {
        id,
        name: name.to_string(),
        gender: Gender::Other,
        email: placeholder_email(name),
        designation: PLACEHOLDER_DESIGNATION.to_string(),
        batch: String::new(),
        biodata: PLACEHOLDER_BIODATA.to_string(),
        created_by: created_by.to_string(),
        created_at: now_iso(),
    }
}

/// Name lookups against a snapshot of the faculty collection that also
/// sees the placeholders it creates.
pub struct FacultyResolver {
    known: Vec<Faculty>,
    created: Vec<String>,
}

impl FacultyResolver {
    pub fn load(store: &Store) -> anyhow::Result<FacultyResolver> {
        Ok(FacultyResolver {
            known: store.faculties.list()?,
            created: Vec::new(),
        })
    }

    pub fn find_by_name(&self, name: &str) -> Option<&Faculty> {
        find_by_name(&self.known, name)
    }

    /// Returns the matching faculty, creating and persisting a placeholder
    /// on a miss.
    pub fn resolve(
        &mut self,
        store: &mut Store,
        ids_cfg: &IdConfig,
        name: &str,
        created_by: &str,
    ) -> anyhow::Result<Faculty> {
        if let Some(f) = self.find_by_name(name) {
            return Ok(f.clone());
        }
        let id = ids::next_id(
            &*store.faculties,
            &mut *store.counters,
            &ids_cfg.faculty_prefix,
            ids_cfg.padding,
        )?;
        let f = placeholder(id, name, created_by);
        store.faculties.put(&f)?;
        info!(id = %f.id, name = %f.name, "created placeholder faculty");
        self.known.push(f.clone());
        self.created.push(name.to_string());
        Ok(f)
    }

    pub fn created(&self) -> &[String] {
        &self.created
    }
}

/// Form payload for creating or editing a faculty profile.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FacultyInput {
    pub name: String,
    pub gender: String,
    pub email: String,
    pub designation: String,
    pub batch: String,
    pub biodata: String,
}

struct ValidFaculty {
    name: String,
    gender: Gender,
    email: String,
    designation: String,
    batch: String,
    biodata: String,
}

fn check_len(field: &str, value: &str, max: usize) -> AppResult<()> {
    if value.chars().count() > max {
        return Err(AppError::validation(format!(
            "{field} must be at most {max} characters"
        )));
    }
    Ok(())
}

fn validate(input: &FacultyInput) -> AppResult<ValidFaculty> {
    let name = input.name.trim();
    let email = input.email.trim();
    let designation = input.designation.trim();
    if name.is_empty() || input.gender.trim().is_empty() || email.is_empty() || designation.is_empty() {
        return Err(AppError::validation(
            "please fill all mandatory fields (name, gender, email, designation)",
        ));
    }
    let gender = Gender::parse(&input.gender)
        .ok_or_else(|| AppError::validation("gender must be one of: Male, Female, Other"))?;
    if !email.contains('@') {
        return Err(AppError::validation("please enter a valid email address"));
    }
    check_len("name", name, MAX_NAME_LEN)?;
    check_len("email", email, MAX_EMAIL_LEN)?;
    check_len("designation", designation, MAX_NAME_LEN)?;
    check_len("batch", &input.batch, MAX_BATCH_LEN)?;
    check_len("biodata", &input.biodata, MAX_BIODATA_LEN)?;
    Ok(ValidFaculty {
        name: name.to_string(),
        gender,
        email: email.to_string(),
        designation: designation.to_string(),
        batch: input.batch.trim().to_string(),
        biodata: input.biodata.clone(),
    })
}

/// Faculties the actor may see, in insertion order.
pub fn visible(store: &Store, actor: &Actor) -> anyhow::Result<Vec<Faculty>> {
    store.faculties.list_where(&|f: &Faculty| actor.can_see(&f.created_by))
}

pub fn get_visible(store: &Store, actor: &Actor, id: &str) -> AppResult<Faculty> {
    store
        .faculties
        .get(id)?
        .filter(|f| actor.can_see(&f.created_by))
        .ok_or_else(|| AppError::not_found(format!("faculty {id} not found")))
}

pub fn create(
    store: &mut Store,
    ids_cfg: &IdConfig,
    actor: &Actor,
    input: &FacultyInput,
) -> AppResult<Faculty> {
    let v = validate(input)?;
    let id = ids::next_id(
        &*store.faculties,
        &mut *store.counters,
        &ids_cfg.faculty_prefix,
        ids_cfg.padding,
    )?;
    let f = Faculty {
        id,
        name: v.name,
        gender: v.gender,
        email: v.email,
        designation: v.designation,
        batch: v.batch,
        biodata: v.biodata,
        created_by: actor.username.clone(),
        created_at: now_iso(),
    };
    store.faculties.put(&f)?;
    info!(id = %f.id, by = %actor.username, "faculty created");
    Ok(f)
}

/// Edits profile fields; id, owner and creation time are kept. Sessions
/// that mention the old name are left untouched.
pub fn update(store: &mut Store, actor: &Actor, id: &str, input: &FacultyInput) -> AppResult<Faculty> {
    let mut f = get_visible(store, actor, id)?;
    let v = validate(input)?;
    f.name = v.name;
    f.gender = v.gender;
    f.email = v.email;
    f.designation = v.designation;
    f.batch = v.batch;
    f.biodata = v.biodata;
    store.faculties.put(&f)?;
    info!(id = %f.id, by = %actor.username, "faculty updated");
    Ok(f)
}

pub fn delete(store: &mut Store, actor: &Actor, id: &str) -> AppResult<()> {
    get_visible(store, actor, id)?;
    store.faculties.delete(id)?;
    info!(id = %id, by = %actor.username, "faculty deleted");
    Ok(())
}

/// Case-insensitive substring match on name or email; blank terms match all.
pub fn search(faculties: Vec<Faculty>, term: &str) -> Vec<Faculty> {
    let t = term.trim().to_lowercase();
    if t.is_empty() {
        return faculties;
    }
    faculties
        .into_iter()
        .filter(|f| f.name.to_lowercase().contains(&t) || f.email.to_lowercase().contains(&t))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn open_store(dir: &std::path::Path) -> Store {
        Store::open(dir, &Config::default()).expect("open store")
    }

    fn actor(name: &str, admin: bool) -> Actor {
        Actor {
            username: name.to_string(),
            is_admin: admin,
        }
    }

    fn input(name: &str) -> FacultyInput {
        FacultyInput {
            name: name.to_string(),
            gender: "female".to_string(),
            email: "jane@uni.edu".to_string(),
            designation: "Professor".to_string(),
            batch: "2024".to_string(),
            biodata: String::new(),
        }
    }

    #[test]
    fn placeholder_email_strips_titles_anywhere() {
        assert_eq!(placeholder_email("Jane Doe"), "jane.doe@faculty.edu");
        assert_eq!(placeholder_email("Dr. Jane Doe"), ".jane.doe@faculty.edu");
        assert_eq!(placeholder_email("Prof. A Dr. B"), ".a.b@faculty.edu");
        assert_eq!(placeholder_email("Sh. Ram"), ".ram@faculty.edu");
    }

    #[test]
    fn placeholder_defaults() {
        let f = placeholder("FAC0009".into(), "Dr. X", "alice");
        assert_eq!(f.gender, Gender::Other);
        assert_eq!(f.designation, "Faculty");
        assert_eq!(f.batch, "");
        assert_eq!(f.biodata, PLACEHOLDER_BIODATA);
        assert_eq!(f.created_by, "alice");
    }

    #[test]
    fn resolving_any_casing_creates_one_placeholder() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut store = open_store(dir.path());
        let ids_cfg = IdConfig::default();
        let mut r = FacultyResolver::load(&store).expect("load");

        let a = r.resolve(&mut store, &ids_cfg, "Dr. Jane Doe", "u").expect("resolve");
        let b = r.resolve(&mut store, &ids_cfg, "dr. jane doe", "u").expect("resolve");
        assert_eq!(a.id, b.id);
        assert_eq!(r.created(), ["Dr. Jane Doe".to_string()]);
        assert_eq!(store.faculties.len().expect("len"), 1);

        // A fresh resolver sees the persisted placeholder.
        let mut r2 = FacultyResolver::load(&store).expect("load");
        let c = r2.resolve(&mut store, &ids_cfg, "DR. JANE DOE", "u").expect("resolve");
        assert_eq!(c.id, a.id);
        assert!(r2.created().is_empty());
    }

    #[test]
    fn first_match_wins_on_duplicate_names() {
        let mk = |id: &str| placeholder(id.to_string(), "Same Name", "u");
        let list = vec![mk("FAC0002"), mk("FAC0001")];
        assert_eq!(find_by_name(&list, "same name").map(|f| f.id.as_str()), Some("FAC0002"));
        assert!(find_by_name(&list, "Same").is_none());
    }

    #[test]
    fn create_validates_and_scopes() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut store = open_store(dir.path());
        let ids_cfg = IdConfig::default();
        let alice = actor("alice", false);
        let bob = actor("bob", false);
        let admin = actor("admin", true);

        let mut bad = input("Jane");
        bad.email = "nope".into();
        assert_eq!(create(&mut store, &ids_cfg, &alice, &bad).unwrap_err().code(), "bad_params");
        let mut bad = input("Jane");
        bad.gender = "x".into();
        assert!(create(&mut store, &ids_cfg, &alice, &bad).is_err());

        let f = create(&mut store, &ids_cfg, &alice, &input("Jane")).expect("create");
        assert_eq!(f.id, "FAC0001");
        assert_eq!(f.gender, Gender::Female);

        assert_eq!(visible(&store, &alice).expect("visible").len(), 1);
        assert_eq!(visible(&store, &bob).expect("visible").len(), 0);
        assert_eq!(visible(&store, &admin).expect("visible").len(), 1);

        assert_eq!(update(&mut store, &bob, &f.id, &input("Bob's")).unwrap_err().code(), "not_found");
        let g = update(&mut store, &admin, &f.id, &input("Jane Q")).expect("update");
        assert_eq!(g.name, "Jane Q");
        assert_eq!(g.created_by, "alice");

        assert!(delete(&mut store, &bob, &f.id).is_err());
        delete(&mut store, &alice, &f.id).expect("delete");
        assert_eq!(store.faculties.len().expect("len"), 0);
    }

    #[test]
    fn search_matches_name_or_email() {
        let mut a = placeholder("FAC0001".into(), "Asha Rao", "u");
        a.email = "asha@x.org".into();
        let b = placeholder("FAC0002".into(), "Vikram", "u");
        let hits = search(vec![a.clone(), b.clone()], "X.ORG");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "FAC0001");
        assert_eq!(search(vec![a, b], "  ").len(), 2);
    }
}

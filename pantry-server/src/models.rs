use crate::database::{Database, FromRow};
use anyhow::Result;
use pantry::basic_models::{
    Category, CategoryFilter, Comment, LikeSummary, Profile, Recipe, RecipeForUpload,
    SignupRequest,
};
use rusqlite::{params, types::Type, OptionalExtension, TransactionBehavior};

/// Timestamps are stored as text in UTC with millisecond precision, so they sort lexically.
pub fn sqlite_current_timestamp() -> String {
    chrono::Utc::now()
        .format("%Y-%m-%d %H:%M:%S%.3f")
        .to_string()
}

/// Map a parse failure on a text column into the error rusqlite expects from `from_row`.
fn conversion_error<E>(row: &rusqlite::Row, column: &str, err: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    let index = row.as_ref().column_index(column).unwrap_or_default();
    rusqlite::Error::FromSqlConversionFailure(index, Type::Text, Box::new(err))
}

fn json_list(row: &rusqlite::Row, column: &str) -> rusqlite::Result<Vec<String>> {
    let text: String = row.get(column)?;
    serde_json::from_str(&text).map_err(|e| conversion_error(row, column, e))
}

impl FromRow for Recipe {
    /// Create a recipe from an sql row, provided by rusqlite, using named columns.
    fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        let category: String = row.get("category")?;
        let difficulty: Option<String> = row.get("difficulty")?;
        Ok(Self {
            recipe_id: row.get("recipe_id")?,
            owner_id: row.get("owner_id")?,
            title: row.get("title")?,
            description: row.get("description")?,
            ingredients: json_list(row, "ingredients")?,
            instructions: json_list(row, "instructions")?,
            category: category
                .parse()
                .map_err(|e| conversion_error(row, "category", e))?,
            cooking_time: row.get("cooking_time")?,
            difficulty: difficulty
                .map(|d| d.parse())
                .transpose()
                .map_err(|e| conversion_error(row, "difficulty", e))?,
            image_url: row.get("image_url")?,
            created_on: row.get("created_on")?,
            updated_on: row.get("updated_on")?,
            revision: row.get("revision")?,
        })
    }
}

/// The part of the document that the database stores column by column.
struct RecipeColumns {
    category: &'static str,
    difficulty: Option<&'static str>,
    ingredients: String,
    instructions: String,
}

impl RecipeColumns {
    fn from_upload(upload: &RecipeForUpload) -> Result<Self> {
        let category: Category = upload
            .category
            .ok_or_else(|| anyhow::anyhow!("Recipe has no category"))?;
        Ok(Self {
            category: category.into(),
            difficulty: upload.difficulty.map(Into::into),
            ingredients: serde_json::to_string(&upload.ingredients)?,
            instructions: serde_json::to_string(&upload.instructions)?,
        })
    }
}

/// Fetch every recipe, optionally restricted to one category, newest first.
///
/// There is no page size: the whole matching set comes back in one go.
pub fn list_recipes(db: &Database, filter: CategoryFilter) -> Result<Vec<Recipe>> {
    match filter.category() {
        None => db.collect_rows(
            "SELECT * FROM Recipe ORDER BY created_on DESC, recipe_id DESC",
            params![],
        ),
        Some(category) => db.collect_rows(
            "SELECT * FROM Recipe
            WHERE category = ?
            ORDER BY created_on DESC, recipe_id DESC",
            params![<&'static str>::from(category)],
        ),
    }
}

/// All the recipes one person has shared, newest first.
pub fn list_recipes_by_owner(db: &Database, owner_id: i64) -> Result<Vec<Recipe>> {
    db.collect_rows(
        "SELECT * FROM Recipe
        WHERE owner_id = ?
        ORDER BY created_on DESC, recipe_id DESC",
        params![owner_id],
    )
}

/// Get a recipe by ID
pub fn get_recipe(db: &Database, recipe_id: i64) -> Result<Option<Recipe>> {
    Ok(db
        .collect_rows("SELECT * FROM Recipe WHERE recipe_id = ?", params![recipe_id])?
        .pop())
}

/// Add a new recipe to the database. The caller is expected to have validated `upload`.
pub fn insert_recipe(
    db: &Database,
    owner_id: i64,
    upload: &RecipeForUpload,
    image_url: Option<&str>,
) -> Result<Recipe> {
    let columns = RecipeColumns::from_upload(upload)?;
    let recipe_id = {
        let conn = db.pool.get()?;
        conn.execute(
            "INSERT INTO Recipe (owner_id, title, description, ingredients, instructions,
                category, cooking_time, difficulty, image_url, created_on)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                owner_id,
                upload.title,
                upload.description,
                columns.ingredients,
                columns.instructions,
                columns.category,
                upload.cooking_time,
                columns.difficulty,
                image_url,
                sqlite_current_timestamp(),
            ],
        )?;
        conn.last_insert_rowid()
    };
    get_recipe(db, recipe_id)?
        .ok_or_else(|| anyhow::anyhow!("Recipe {recipe_id} vanished after insert"))
}

#[derive(Debug)]
pub enum UpdateOutcome {
    Updated(Recipe),
    /// The caller edited an older revision than the one stored
    Stale,
}

/// Replace a recipe's document wholesale, keeping its owner and creation time.
///
/// Without `upload.revision` this is last-write-wins. With it, the update only applies
/// if the stored revision still matches.
pub fn update_recipe(
    db: &Database,
    recipe_id: i64,
    upload: &RecipeForUpload,
    image_url: Option<&str>,
) -> Result<UpdateOutcome> {
    let columns = RecipeColumns::from_upload(upload)?;
    let changed = {
        let conn = db.pool.get()?;
        conn.execute(
            "UPDATE Recipe SET
                title = ?, description = ?, ingredients = ?, instructions = ?,
                category = ?, cooking_time = ?, difficulty = ?, image_url = ?,
                updated_on = ?, revision = revision + 1
            WHERE recipe_id = ? AND (?11 IS NULL OR revision = ?11)",
            params![
                upload.title,
                upload.description,
                columns.ingredients,
                columns.instructions,
                columns.category,
                upload.cooking_time,
                columns.difficulty,
                image_url,
                sqlite_current_timestamp(),
                recipe_id,
                upload.revision,
            ],
        )?
    };
    if changed == 0 {
        return Ok(UpdateOutcome::Stale);
    }
    let recipe = get_recipe(db, recipe_id)?
        .ok_or_else(|| anyhow::anyhow!("Recipe {recipe_id} vanished after update"))?;
    Ok(UpdateOutcome::Updated(recipe))
}

impl FromRow for Profile {
    fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok(Self {
            profile_id: row.get("profile_id")?,
            username: row.get("username")?,
            full_name: row.get("full_name")?,
            bio: row.get("bio")?,
            created_on: row.get("created_on")?,
        })
    }
}

pub fn get_profile(db: &Database, profile_id: i64) -> Result<Option<Profile>> {
    Ok(db
        .collect_rows(
            "SELECT * FROM Profile WHERE profile_id = ?",
            params![profile_id],
        )?
        .pop())
}

pub fn count_profiles(db: &Database) -> Result<i64> {
    let conn = db.pool.get()?;
    let count = conn.query_row("SELECT COUNT(*) FROM Profile", params![], |row| row.get(0))?;
    Ok(count)
}

/// Sign-up lost a uniqueness race or reused a name.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountConflict {
    #[error("That username is already taken.")]
    Username,
    #[error("An account with that email already exists.")]
    Email,
}

/// Create the profile and its login credential together.
pub fn create_account(
    db: &Database,
    signup: &SignupRequest,
    password_hash: &str,
) -> Result<Profile> {
    let profile_id = {
        let mut conn = db.pool.get()?;
        let tx = conn.transaction()?;
        let username_taken: bool = tx.query_row(
            "SELECT EXISTS(SELECT 1 FROM Profile WHERE username = ?)",
            params![signup.username],
            |row| row.get(0),
        )?;
        if username_taken {
            return Err(AccountConflict::Username.into());
        }
        let email_taken: bool = tx.query_row(
            "SELECT EXISTS(SELECT 1 FROM Credential WHERE email = ?)",
            params![signup.email],
            |row| row.get(0),
        )?;
        if email_taken {
            return Err(AccountConflict::Email.into());
        }
        tx.execute(
            "INSERT INTO Profile (username, full_name, created_on) VALUES (?, ?, ?)",
            params![signup.username, signup.full_name, sqlite_current_timestamp()],
        )?;
        let profile_id = tx.last_insert_rowid();
        tx.execute(
            "INSERT INTO Credential (profile_id, email, password_hash) VALUES (?, ?, ?)",
            params![profile_id, signup.email, password_hash],
        )?;
        tx.commit()?;
        profile_id
    };
    get_profile(db, profile_id)?
        .ok_or_else(|| anyhow::anyhow!("Profile {profile_id} vanished after insert"))
}

/// A stored login. Never leaves the server.
#[derive(Debug, Clone)]
pub struct Credential {
    pub profile_id: i64,
    pub email: String,
    pub password_hash: String,
}

impl FromRow for Credential {
    fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok(Self {
            profile_id: row.get("profile_id")?,
            email: row.get("email")?,
            password_hash: row.get("password_hash")?,
        })
    }
}

pub fn find_credential(db: &Database, email: &str) -> Result<Option<Credential>> {
    Ok(db
        .collect_rows("SELECT * FROM Credential WHERE email = ?", params![email])?
        .pop())
}

/// Flip the like for this person and recipe. Returns whether it is now liked.
pub fn toggle_like(db: &Database, recipe_id: i64, profile_id: i64) -> Result<bool> {
    let mut conn = db.pool.get()?;
    // Immediate, so concurrent toggles queue up instead of both inserting
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let removed = tx.execute(
        "DELETE FROM RecipeLike WHERE recipe_id = ? AND profile_id = ?",
        params![recipe_id, profile_id],
    )?;
    if removed == 0 {
        tx.execute(
            "INSERT INTO RecipeLike (recipe_id, profile_id, created_on) VALUES (?, ?, ?)",
            params![recipe_id, profile_id, sqlite_current_timestamp()],
        )?;
    }
    tx.commit()?;
    Ok(removed == 0)
}

pub fn like_summary(db: &Database, recipe_id: i64, viewer: Option<i64>) -> Result<LikeSummary> {
    let conn = db.pool.get()?;
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM RecipeLike WHERE recipe_id = ?",
        params![recipe_id],
        |row| row.get(0),
    )?;
    let liked_by_me = match viewer {
        Some(profile_id) => conn
            .query_row(
                "SELECT 1 FROM RecipeLike WHERE recipe_id = ? AND profile_id = ?",
                params![recipe_id, profile_id],
                |_| Ok(()),
            )
            .optional()?
            .is_some(),
        None => false,
    };
    Ok(LikeSummary { count, liked_by_me })
}

impl FromRow for Comment {
    fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok(Self {
            comment_id: row.get("comment_id")?,
            recipe_id: row.get("recipe_id")?,
            profile_id: row.get("profile_id")?,
            author: row.get("author")?,
            content: row.get("content")?,
            created_on: row.get("created_on")?,
        })
    }
}

const COMMENT_COLUMNS: &str = "
    SELECT Comment.*,
        COALESCE(NULLIF(TRIM(Profile.full_name), ''), Profile.username) AS author
    FROM Comment
    JOIN Profile ON Profile.profile_id = Comment.profile_id";

/// Comments on a recipe, oldest first
pub fn list_comments(db: &Database, recipe_id: i64) -> Result<Vec<Comment>> {
    db.collect_rows(
        &format!(
            "{COMMENT_COLUMNS}
            WHERE Comment.recipe_id = ?
            ORDER BY Comment.created_on, Comment.comment_id"
        ),
        params![recipe_id],
    )
}

pub fn add_comment(
    db: &Database,
    recipe_id: i64,
    profile_id: i64,
    content: &str,
) -> Result<Comment> {
    let comment_id = {
        let conn = db.pool.get()?;
        conn.execute(
            "INSERT INTO Comment (recipe_id, profile_id, content, created_on) VALUES (?, ?, ?, ?)",
            params![recipe_id, profile_id, content, sqlite_current_timestamp()],
        )?;
        conn.last_insert_rowid()
    };
    db.collect_rows(
        &format!("{COMMENT_COLUMNS} WHERE Comment.comment_id = ?"),
        params![comment_id],
    )?
    .pop()
    .ok_or_else(|| anyhow::anyhow!("Comment {comment_id} vanished after insert"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pantry::basic_models::Difficulty;

    fn test_db() -> (tempfile::TempDir, Database) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::connect(dir.path().join("pantry.db")).unwrap();
        (dir, db)
    }

    fn signup(db: &Database, username: &str) -> Profile {
        create_account(
            db,
            &SignupRequest {
                email: format!("{username}@example.com"),
                password: "unused".into(),
                username: username.into(),
                full_name: None,
            },
            "not-a-real-hash",
        )
        .unwrap()
    }

    fn upload(title: &str, category: Category) -> RecipeForUpload {
        RecipeForUpload {
            title: title.into(),
            description: Some("Tasty".into()),
            ingredients: vec!["2 eggs".into(), "flour".into()],
            instructions: vec!["Whisk".into(), "Fry".into()],
            category: Some(category),
            cooking_time: Some(15),
            difficulty: Some(Difficulty::Easy),
            image_url: None,
            revision: None,
        }
    }

    #[test]
    fn category_filter_returns_exact_matches() {
        let (_dir, db) = test_db();
        let owner = signup(&db, "ada");
        let mousse = insert_recipe(
            &db,
            owner.profile_id,
            &upload("Mousse", Category::Dessert),
            None,
        )
        .unwrap();
        insert_recipe(&db, owner.profile_id, &upload("Soup", Category::Lunch), None).unwrap();

        let desserts = list_recipes(&db, CategoryFilter::Only(Category::Dessert)).unwrap();
        assert_eq!(desserts, vec![mousse]);
        assert_eq!(list_recipes(&db, CategoryFilter::All).unwrap().len(), 2);
    }

    #[test]
    fn listing_is_newest_first() {
        let (_dir, db) = test_db();
        let owner = signup(&db, "ada");
        for title in ["first", "second", "third"] {
            insert_recipe(&db, owner.profile_id, &upload(title, Category::Dinner), None).unwrap();
        }
        let titles: Vec<String> = list_recipes(&db, CategoryFilter::All)
            .unwrap()
            .into_iter()
            .map(|r| r.title)
            .collect();
        assert_eq!(titles, ["third", "second", "first"]);
    }

    #[test]
    fn sequences_round_trip_in_order() {
        let (_dir, db) = test_db();
        let owner = signup(&db, "ada");
        let stored = insert_recipe(
            &db,
            owner.profile_id,
            &upload("Crepes", Category::Breakfast),
            Some("http://img/1.png"),
        )
        .unwrap();
        assert_eq!(stored.ingredients, ["2 eggs", "flour"]);
        assert_eq!(stored.instructions, ["Whisk", "Fry"]);
        assert_eq!(stored.difficulty, Some(Difficulty::Easy));
        assert_eq!(stored.image_url.as_deref(), Some("http://img/1.png"));
        assert_eq!(stored.revision, 1);
        assert_eq!(stored.updated_on, None);
    }

    #[test]
    fn update_without_revision_is_last_write_wins() {
        let (_dir, db) = test_db();
        let owner = signup(&db, "ada");
        let stored = insert_recipe(
            &db,
            owner.profile_id,
            &upload("Crepes", Category::Breakfast),
            None,
        )
        .unwrap();
        let mut first = upload("Crepes v2", Category::Breakfast);
        first.ingredients.reverse();
        let second = upload("Crepes v3", Category::Dessert);
        update_recipe(&db, stored.recipe_id, &first, None).unwrap();
        let outcome = update_recipe(&db, stored.recipe_id, &second, None).unwrap();
        let UpdateOutcome::Updated(latest) = outcome else {
            panic!("update was rejected");
        };
        assert_eq!(latest.title, "Crepes v3");
        assert_eq!(latest.category, Category::Dessert);
        assert_eq!(latest.revision, 3);
        assert_eq!(latest.owner_id, owner.profile_id);
        assert!(latest.updated_on.is_some());
    }

    #[test]
    fn stale_revision_is_rejected() {
        let (_dir, db) = test_db();
        let owner = signup(&db, "ada");
        let stored = insert_recipe(
            &db,
            owner.profile_id,
            &upload("Crepes", Category::Breakfast),
            None,
        )
        .unwrap();

        let mut edit = upload("Mine", Category::Breakfast);
        edit.revision = Some(stored.revision);
        assert!(matches!(
            update_recipe(&db, stored.recipe_id, &edit, None).unwrap(),
            UpdateOutcome::Updated(_)
        ));

        let mut late = upload("Theirs", Category::Breakfast);
        late.revision = Some(stored.revision);
        assert!(matches!(
            update_recipe(&db, stored.recipe_id, &late, None).unwrap(),
            UpdateOutcome::Stale
        ));
        assert_eq!(get_recipe(&db, stored.recipe_id).unwrap().unwrap().title, "Mine");
    }

    #[test]
    fn duplicate_username_and_email_are_conflicts() {
        let (_dir, db) = test_db();
        signup(&db, "ada");
        let same_name = SignupRequest {
            email: "other@example.com".into(),
            password: "unused".into(),
            username: "ada".into(),
            full_name: None,
        };
        let err = create_account(&db, &same_name, "x").unwrap_err();
        assert_eq!(err.downcast_ref::<AccountConflict>(), Some(&AccountConflict::Username));

        let same_email = SignupRequest {
            username: "grace".into(),
            email: "ada@example.com".into(),
            ..same_name
        };
        let err = create_account(&db, &same_email, "x").unwrap_err();
        assert_eq!(err.downcast_ref::<AccountConflict>(), Some(&AccountConflict::Email));
        assert_eq!(count_profiles(&db).unwrap(), 1);
    }

    #[test]
    fn likes_toggle() {
        let (_dir, db) = test_db();
        let ada = signup(&db, "ada");
        let grace = signup(&db, "grace");
        let recipe = insert_recipe(
            &db,
            ada.profile_id,
            &upload("Crepes", Category::Breakfast),
            None,
        )
        .unwrap();

        assert!(toggle_like(&db, recipe.recipe_id, grace.profile_id).unwrap());
        assert!(toggle_like(&db, recipe.recipe_id, ada.profile_id).unwrap());
        let summary = like_summary(&db, recipe.recipe_id, Some(grace.profile_id)).unwrap();
        assert_eq!(summary, LikeSummary { count: 2, liked_by_me: true });

        assert!(!toggle_like(&db, recipe.recipe_id, grace.profile_id).unwrap());
        let summary = like_summary(&db, recipe.recipe_id, Some(grace.profile_id)).unwrap();
        assert_eq!(summary, LikeSummary { count: 1, liked_by_me: false });
        assert!(!like_summary(&db, recipe.recipe_id, None).unwrap().liked_by_me);
    }

    #[test]
    fn concurrent_toggles_never_double_like() {
        let (_dir, db) = test_db();
        let ada = signup(&db, "ada");
        let recipe = insert_recipe(
            &db,
            ada.profile_id,
            &upload("Crepes", Category::Breakfast),
            None,
        )
        .unwrap();

        let liked: Vec<bool> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| scope.spawn(|| toggle_like(&db, recipe.recipe_id, ada.profile_id)))
                .collect();
            handles
                .into_iter()
                .map(|handle| handle.join().unwrap().unwrap())
                .collect()
        });
        // Toggles alternate, so half of them liked and half unliked
        assert_eq!(liked.iter().filter(|l| **l).count(), 4);
        let summary = like_summary(&db, recipe.recipe_id, Some(ada.profile_id)).unwrap();
        assert_eq!(summary, LikeSummary { count: 0, liked_by_me: false });
    }

    #[test]
    fn comments_are_listed_oldest_first_with_author() {
        let (_dir, db) = test_db();
        let ada = signup(&db, "ada");
        let recipe = insert_recipe(
            &db,
            ada.profile_id,
            &upload("Crepes", Category::Breakfast),
            None,
        )
        .unwrap();
        add_comment(&db, recipe.recipe_id, ada.profile_id, "First!").unwrap();
        let second = add_comment(&db, recipe.recipe_id, ada.profile_id, "Also great cold").unwrap();
        assert_eq!(second.author, "ada");

        let comments = list_comments(&db, recipe.recipe_id).unwrap();
        let contents: Vec<&str> = comments.iter().map(|c| c.content.as_str()).collect();
        assert_eq!(contents, ["First!", "Also great cold"]);
    }

    #[test]
    fn recipes_by_owner() {
        let (_dir, db) = test_db();
        let ada = signup(&db, "ada");
        let grace = signup(&db, "grace");
        insert_recipe(&db, ada.profile_id, &upload("Crepes", Category::Breakfast), None).unwrap();
        insert_recipe(&db, grace.profile_id, &upload("Cobbler", Category::Dessert), None).unwrap();
        let mine = list_recipes_by_owner(&db, grace.profile_id).unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].title, "Cobbler");
    }
}

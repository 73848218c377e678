use tabula_store::{
    Column, Database, EntityClass, InnerTableLink, InsertStatement, Reference, Referrers,
    TabulaConfig, TabulaError, TabulaResult, Table, Transaction, Value,
};
use tempfile::{TempDir, tempdir};

struct Model {
    cities: Table,
    users: Table,
    city_name: Column,
    user_id: Column,
    user_name: Column,
    user_city: Column,
    visits: Table,
    visit_user: Column,
    visit_city: Column,
}

fn model() -> TabulaResult<Model> {
    let mut cities = Table::builder("cities");
    let city_id = cities.integer("id").auto_increment().primary_key().column();
    let city_name = cities.varchar("name", 50).column();
    let mut users = Table::builder("users");
    let user_id = users.varchar("id", 10).primary_key().column();
    let user_name = users.varchar("name", 50).column();
    let user_city = users.reference("city_id", &city_id).nullable().column();
    let mut visits = Table::builder("visits");
    let visit_user = visits.varchar("user_id", 10).references(&user_id).column();
    let visit_city = visits.reference("city_id", &city_id).column();
    Ok(Model {
        cities: cities.build()?,
        users: users.build()?,
        city_name,
        user_id,
        user_name,
        user_city,
        visits: visits.build()?,
        visit_user,
        visit_city,
    })
}

async fn open(dir: &TempDir, model: &Model) -> TabulaResult<Database> {
    let database =
        Database::connect(&TabulaConfig::default_sqlite("entities.sqlite"), dir.path()).await?;
    let mut tx = database.begin().await?;
    tx.create_tables(&[&model.cities, &model.users, &model.visits])
        .await?;
    tx.commit().await?;
    Ok(database)
}

async fn seed(tx: &mut Transaction, model: &Model, cities: &EntityClass, users: &EntityClass) -> TabulaResult<()> {
    let munich = cities
        .create(tx, vec![(model.city_name.clone(), Value::from("Munich"))])
        .await?;
    let prague = cities
        .create(tx, vec![(model.city_name.clone(), Value::from("Prague"))])
        .await?;
    for (id, name, city) in [("sergey", "Sergey", &munich), ("eugene", "Eugene", &munich)] {
        users
            .create(
                tx,
                vec![
                    (model.user_id.clone(), Value::from(id)),
                    (model.user_name.clone(), Value::from(name)),
                    (model.user_city.clone(), city.id.clone()),
                ],
            )
            .await?;
    }
    assert_eq!(prague.id, Value::Int(2));
    Ok(())
}

#[tokio::test]
async fn identity_is_preserved_within_a_transaction() -> TabulaResult<()> {
    let dir = tempdir().expect("tempdir");
    let model = model()?;
    let database = open(&dir, &model).await?;
    let cities = EntityClass::new(&model.cities)?;
    let users = EntityClass::new(&model.users)?;
    let mut tx = database.begin().await?;
    seed(&mut tx, &model, &cities, &users).await?;

    let first = users.get(&mut tx, "sergey").await?;
    tx.entity_mut(&first)?.set(&model.user_name, "Serge")?;
    let again = users
        .find(&mut tx, model.user_name.eq("Serge")?)
        .await?;
    assert_eq!(again, vec![first.clone()]);
    assert_eq!(
        tx.entity(&first)?.get_as::<String>(&model.user_name)?,
        "Serge"
    );
    assert_eq!(tx.cache().len(), 4);

    let ordered = users
        .for_ids(&mut tx, vec![Value::from("eugene"), Value::from("nobody"), Value::from("sergey")])
        .await?;
    assert_eq!(ordered, vec![users.key("eugene"), users.key("sergey")]);
    assert!(users.find_by_id(&mut tx, "nobody").await?.is_none());
    let err = users.get(&mut tx, "nobody").await.unwrap_err();
    assert!(matches!(err, TabulaError::Invalid { .. }));
    tx.rollback().await
}

#[tokio::test]
async fn references_follow_foreign_keys() -> TabulaResult<()> {
    let dir = tempdir().expect("tempdir");
    let model = model()?;
    let database = open(&dir, &model).await?;
    let cities = EntityClass::new(&model.cities)?;
    let users = EntityClass::new(&model.users)?;
    let city = Reference::new(&model.user_city, &cities)?;
    let residents = Referrers::new(&users, &model.user_city)?;
    let mut tx = database.begin().await?;
    seed(&mut tx, &model, &cities, &users).await?;

    let sergey = users.get(&mut tx, "sergey").await?;
    let munich = city.get(&mut tx, &sergey).await?.expect("city");
    assert_eq!(
        tx.entity(&munich)?.get_as::<String>(&model.city_name)?,
        "Munich"
    );
    assert_eq!(residents.count(&mut tx, &munich).await?, 2);
    assert!(!residents.empty(&mut tx, &munich).await?);
    let loaded = residents.load(&mut tx, &munich).await?;
    assert_eq!(loaded.len(), 2);
    assert!(loaded.contains(&sergey));

    let prague = cities.get(&mut tx, 2).await?;
    assert!(residents.empty(&mut tx, &prague).await?);
    city.set(&mut tx, &sergey, Some(&prague))?;
    assert_eq!(city.get(&mut tx, &sergey).await?, Some(prague.clone()));
    city.set(&mut tx, &sergey, None)?;
    assert_eq!(city.get(&mut tx, &sergey).await?, None);

    assert!(Reference::new(&model.user_name, &cities).is_err());
    assert!(Referrers::new(&users, &model.user_name).is_err());
    tx.rollback().await
}

#[tokio::test]
async fn commit_flushes_and_rollback_discards() -> TabulaResult<()> {
    let dir = tempdir().expect("tempdir");
    let model = model()?;
    let database = open(&dir, &model).await?;
    let cities = EntityClass::new(&model.cities)?;
    let users = EntityClass::new(&model.users)?;
    let city = Reference::new(&model.user_city, &cities)?;

    let mut tx = database.begin().await?;
    seed(&mut tx, &model, &cities, &users).await?;
    let eugene = users.get(&mut tx, "eugene").await?;
    let prague = cities.get(&mut tx, 2).await?;
    tx.entity_mut(&eugene)?.set(&model.user_name, "Evgeny")?;
    city.set(&mut tx, &eugene, Some(&prague))?;
    tx.commit().await?;

    let mut tx = database.begin().await?;
    assert!(tx.cache().is_empty());
    let eugene = users.get(&mut tx, "eugene").await?;
    assert_eq!(
        tx.entity(&eugene)?.get_as::<String>(&model.user_name)?,
        "Evgeny"
    );
    assert_eq!(city.get(&mut tx, &eugene).await?, Some(cities.key(2)));
    tx.entity_mut(&eugene)?.set(&model.user_name, "Gene")?;
    tx.rollback().await?;

    let mut tx = database.begin().await?;
    let eugene = users.get(&mut tx, "eugene").await?;
    assert_eq!(
        tx.entity(&eugene)?.get_as::<String>(&model.user_name)?,
        "Evgeny"
    );
    tx.rollback().await
}

#[tokio::test]
async fn delete_evicts_entity() -> TabulaResult<()> {
    let dir = tempdir().expect("tempdir");
    let model = model()?;
    let database = open(&dir, &model).await?;
    let cities = EntityClass::new(&model.cities)?;
    let users = EntityClass::new(&model.users)?;
    let mut tx = database.begin().await?;
    seed(&mut tx, &model, &cities, &users).await?;

    let sergey = users.get(&mut tx, "sergey").await?;
    let err = cities.delete(&mut tx, &sergey).await.unwrap_err();
    assert!(matches!(err, TabulaError::NoTargetTable { .. }));
    assert_eq!(users.delete(&mut tx, &sergey).await?, 1);
    assert!(!tx.cache().contains(&sergey));
    assert!(users.find_by_id(&mut tx, "sergey").await?.is_none());
    assert_eq!(users.count(&mut tx, None).await?, 1);
    assert_eq!(users.all(&mut tx).await?, vec![users.key("eugene")]);
    tx.commit().await
}

async fn visit(tx: &mut Transaction, model: &Model, user: &str, city: i64) -> TabulaResult<()> {
    let mut insert = InsertStatement::new(&model.visits);
    insert
        .set(&model.visit_user, user)?
        .set(&model.visit_city, city)?;
    insert.execute(tx).await?;
    Ok(())
}

#[tokio::test]
async fn views_and_links_select_entities() -> TabulaResult<()> {
    let dir = tempdir().expect("tempdir");
    let model = model()?;
    let database = open(&dir, &model).await?;
    let cities = EntityClass::new(&model.cities)?;
    let users = EntityClass::new(&model.users)?;
    let mut tx = database.begin().await?;
    seed(&mut tx, &model, &cities, &users).await?;

    let in_munich = users.view(model.user_city.eq(Value::Int(1))?);
    assert_eq!(in_munich.count(&mut tx).await?, 2);
    assert!(!in_munich.empty(&mut tx).await?);
    let sergey = users.get(&mut tx, "sergey").await?;
    let eugene = users.get(&mut tx, "eugene").await?;
    tx.entity_mut(&eugene)?.set(&model.user_city, Value::Int(2))?;
    assert_eq!(in_munich.load(&mut tx).await?, vec![sergey.clone()]);
    assert!(users.view(model.user_name.eq("Nobody")?).empty(&mut tx).await?);

    visit(&mut tx, &model, "sergey", 1).await?;
    visit(&mut tx, &model, "sergey", 2).await?;
    visit(&mut tx, &model, "eugene", 2).await?;
    let visited = InnerTableLink::new(&model.visits, &cities)?;
    let mut places = visited.load(&mut tx, &sergey).await?;
    places.sort_by_key(|key| key.id.to_string());
    assert_eq!(places, vec![cities.key(1), cities.key(2)]);
    assert_eq!(visited.count(&mut tx, &eugene).await?, 1);
    assert!(!visited.empty(&mut tx, &eugene).await?);

    let visitors = users.via(&model.visits)?;
    let prague = cities.get(&mut tx, 2).await?;
    assert_eq!(visitors.count(&mut tx, &prague).await?, 2);
    assert!(visited.load(&mut tx, &prague).await.is_err());
    assert!(InnerTableLink::new(&model.cities, &users).is_err());
    tx.rollback().await
}

#[tokio::test]
async fn create_requires_columns_without_defaults() -> TabulaResult<()> {
    let dir = tempdir().expect("tempdir");
    let model = model()?;
    let database = open(&dir, &model).await?;
    let cities = EntityClass::new(&model.cities)?;
    let users = EntityClass::new(&model.users)?;
    let mut tx = database.begin().await?;
    seed(&mut tx, &model, &cities, &users).await?;

    let err = users
        .create(&mut tx, vec![(model.user_id.clone(), Value::from("andrey"))])
        .await
        .unwrap_err();
    assert!(matches!(err, TabulaError::Invalid { .. }));
    assert!(err.to_string().contains("users.name"));
    assert_eq!(users.count(&mut tx, None).await?, 2);

    let andrey = users
        .create(
            &mut tx,
            vec![
                (model.user_id.clone(), Value::from("andrey")),
                (model.user_name.clone(), Value::from("Andrey")),
            ],
        )
        .await?;
    assert_eq!(tx.entity(&andrey)?.get(&model.user_city)?, Value::Null);
    tx.rollback().await
}

#[tokio::test]
async fn referrer_collections_follow_writes() -> TabulaResult<()> {
    let dir = tempdir().expect("tempdir");
    let model = model()?;
    let database = open(&dir, &model).await?;
    let cities = EntityClass::new(&model.cities)?;
    let users = EntityClass::new(&model.users)?;
    let city = Reference::new(&model.user_city, &cities)?;
    let residents = Referrers::new(&users, &model.user_city)?;
    let mut tx = database.begin().await?;
    seed(&mut tx, &model, &cities, &users).await?;

    let munich = cities.get(&mut tx, 1).await?;
    let prague = cities.get(&mut tx, 2).await?;
    assert_eq!(residents.load(&mut tx, &munich).await?.len(), 2);
    assert!(residents.empty(&mut tx, &prague).await?);

    let sergey = users.get(&mut tx, "sergey").await?;
    city.set(&mut tx, &sergey, Some(&prague))?;
    assert_eq!(
        residents.load(&mut tx, &munich).await?,
        vec![users.key("eugene")]
    );
    assert_eq!(residents.load(&mut tx, &prague).await?, vec![sergey.clone()]);
    assert_eq!(residents.count(&mut tx, &prague).await?, 1);

    let eugene = users.get(&mut tx, "eugene").await?;
    users.delete(&mut tx, &eugene).await?;
    assert!(residents.empty(&mut tx, &munich).await?);

    users
        .create(
            &mut tx,
            vec![
                (model.user_id.clone(), Value::from("andrey")),
                (model.user_name.clone(), Value::from("Andrey")),
                (model.user_city.clone(), Value::Int(1)),
            ],
        )
        .await?;
    assert_eq!(residents.count(&mut tx, &munich).await?, 1);
    assert_eq!(
        residents.load(&mut tx, &munich).await?,
        vec![users.key("andrey")]
    );
    tx.rollback().await
}
